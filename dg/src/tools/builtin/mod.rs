//! Built-in tool implementations

mod auth;
mod calibration;
mod create_task;
mod feedback;
mod get_materials;
mod get_status;
mod notify;
mod queue_targets;
mod reference_candidates;
mod stop_task;

pub use auth::{GetAuthQueueTool, ResolveAuthTool};
pub use calibration::{CalibrationMetricsTool, CalibrationRollbackTool};
pub use create_task::CreateTaskTool;
pub use feedback::FeedbackTool;
pub use get_materials::GetMaterialsTool;
pub use get_status::GetStatusTool;
pub use notify::{NotifyUserTool, WaitForUserTool};
pub use queue_targets::QueueTargetsTool;
pub use reference_candidates::QueueReferenceCandidatesTool;
pub use stop_task::StopTaskTool;
