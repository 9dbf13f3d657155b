use std::sync::Arc;

use gsadmin_jobs::JobsApi;

use crate::cli::{GlobalArgs, WatchArgs};
use crate::commands::{connect_tracker, ctrl_c, follow::follow};

pub async fn execute(global: &GlobalArgs, args: WatchArgs) -> anyhow::Result<i32> {
    let api = Arc::new(JobsApi::new(&global.url, global.token.clone()));
    let tracker = connect_tracker(global, api).await;

    let code = follow(
        &tracker,
        args.job_id,
        args.kind,
        ctrl_c(),
        &mut std::io::stdout(),
    )
    .await;
    tracker.shutdown().await;
    code
}
