mod client_tests;
mod project_tests;
mod refresh_tests;
mod session_tests;
