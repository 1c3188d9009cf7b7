//! Pipeline — runs the specialists in stage order for one campaign.

pub mod coordinator;

pub use coordinator::{DeliveryReport, PipelineCoordinator, PipelineReport, DELIVERY_REPORT_FILE};
