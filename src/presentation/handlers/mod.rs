mod error;
mod health;
mod job_result;
mod job_status;
mod stages;
mod submit;
mod upload;

pub use error::ErrorResponse;
pub use health::health_handler;
pub use job_result::job_result_handler;
pub use job_status::{JobStatusResponse, ProgressMeta, job_status_handler};
pub use stages::{StageInfo, stages_handler};
pub use submit::{SubmitResponse, submit_handler};
pub use upload::upload_handler;
