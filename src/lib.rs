//! Client for the PCATS causal-inference service.
//!
//! Submit static (single-stage) or dynamic (two-stage) GP/BART analyses,
//! poll them until they finish, fetch the formatted result and run CATE
//! follow-ups on completed static jobs.
//!
//! ```no_run
//! use pcats_client::{ClientConfig, JobClient, PollPolicy, StageParams, StaticRequest};
//!
//! # async fn demo() -> pcats_client::ClientResult<()> {
//! let client = JobClient::new(ClientConfig::default())?;
//! let request = StaticRequest::new("example1.csv", StageParams::new("Y", "A", "X", "X"));
//!
//! let mut job = client.submit_static(&request).await?;
//! client.wait_for_result(&mut job, &PollPolicy::default()).await?;
//! let result = client.fetch_result(&mut job).await?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod data;
pub mod error;
pub mod models;
pub mod poll;
pub mod report;
pub mod request;

pub use client::{ClientConfig, JobClient, DEFAULT_BASE_URL};
pub use error::{ClientError, ClientResult};
pub use models::{Job, JobId, JobKind, JobResult, JobStatus};
pub use poll::{Backoff, PollPolicy};
pub use request::{
    AnalysisRequest, BoundCensor, CateRequest, DynamicRequest, Method, RequestFile, RunParams,
    StageParams, StaticRequest, ValueList, VarList, VariableType,
};
