mod error;
mod gateway;
mod logging;
mod registry;
mod selection;
mod server;

pub use error::GatewayError;
pub use gateway::{AppListing, AppSummary, DeviceSummary, Gateway, ReconcileReport};
pub use logging::init as init_logging;
pub use registry::{
    ApplicationRegistry, ApplicationRegistryEntry, Document, DocumentStore, FileDocumentStore,
    LocalRegistry, MemoryDocumentStore, TemplateRegistry,
};
pub use selection::{
    AppTarget, DeviceSelection, DeviceTarget, ManagerTarget, NotConfigured, Selection,
    SelectionPhase, SelectionSlot,
};
pub use server::{GatewayConfig, GatewayState, build_gateway_app};
