pub mod accounts;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod graph;
pub mod mock;
pub mod project;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use accounts::AccountClient;
pub use config::{ApiSettings, ClientSettings, ConfigError, Endpoints};
pub use credentials::{CredentialPair, CredentialStore};
pub use error::SyncError;
pub use fetcher::{AuthenticatedFetcher, RefreshPolicy};
pub use graph::{
    ConnectRejection, Connection, Edge, EdgeChange, GraphModel, GraphSnapshot, Node, NodeChange,
    Position, SyncStatus,
};
pub use mock::{MockBackend, MockFault, MockRoute};
pub use project::{LoadTicket, ProjectRecord, ProjectSync};
pub use session::{Route, SessionController, SessionEvent, SessionState};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport, TransportError};
