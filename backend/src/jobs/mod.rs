// Background Jobs
//
// Scheduled with tokio-cron-scheduler. Only the auto-invoicing batch runs
// today; it is registered when AUTO_INVOICE_ENABLED is set and can also be
// triggered through `/api/jobs/:name/run`.

pub mod auto_invoicing;
pub mod scheduler;

pub use auto_invoicing::{AutoInvoicingJob, AutoInvoicingResult};
pub use scheduler::{run_job_now, ExecutionLog, JobError, JobResult, JobScheduler};
