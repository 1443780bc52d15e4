use std::time::Duration;

use quill::{Coordinator, CoordinatorConfig};

use crate::cli::CoordinatorCmd;

pub async fn run(cmd: CoordinatorCmd) -> quill::Result<()> {
    let config = CoordinatorConfig {
        bind_addr: cmd.bind,
        db_path: cmd.db,
        liveness_timeout: Duration::from_secs(cmd.liveness_timeout.max(1)),
        ..CoordinatorConfig::default()
    };
    let coordinator = Coordinator::bind(config).await?;

    tokio::select! {
        result = coordinator.run() => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutdown signal received, stopping coordinator");
            Ok(())
        }
    }
}
