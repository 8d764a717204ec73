// Survana - Client-side Survey Toolkit

pub mod config;
pub mod deadline;
pub mod form;
pub mod queue;
pub mod schema;
pub mod storage;
pub mod transport;
pub mod validation;
pub mod workflow;

pub use config::SurveyConfig;
pub use form::{Control, ControlKind, FieldIdentity, RenderedForm};
pub use queue::{QueueError, ResponseQueue};
pub use schema::{Field, FieldKind, Schema, SchemaError};
pub use storage::{LocalStorage, MemoryStorage, Storage, StorageError};
pub use transport::{HttpTransport, Transport, TransportError};
pub use validation::{ValidationConfig, ValidationEngine, ValidationError, ValidationResult};
pub use workflow::{Transition, Trigger, WorkflowController, WorkflowError, WorkflowState};
