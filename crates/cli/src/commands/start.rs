use std::sync::Arc;

use anyhow::Context;

use gsadmin_jobs::JobsApi;

use crate::cli::{params_json, GlobalArgs, StartArgs};
use crate::commands::{connect_tracker, ctrl_c, follow::follow};

pub async fn execute(global: &GlobalArgs, args: StartArgs) -> anyhow::Result<i32> {
    let api = Arc::new(JobsApi::new(&global.url, global.token.clone()));

    let job_id = api
        .start_job(args.kind, &params_json(&args.params))
        .await
        .with_context(|| format!("failed to start {} job", args.kind))?;
    println!("Started {} job {job_id}", args.kind.label().to_lowercase());

    let tracker = connect_tracker(global, api).await;
    let code = follow(&tracker, job_id, args.kind, ctrl_c(), &mut std::io::stdout()).await;
    tracker.shutdown().await;
    code
}
