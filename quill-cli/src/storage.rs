use std::time::Duration;

use quill::{StorageConfig, StorageServer};

use crate::cli::StorageCmd;

pub async fn run(cmd: StorageCmd) -> quill::Result<()> {
    let config = StorageConfig {
        coordinator_addr: cmd.coordinator,
        bind_addr: cmd.bind,
        data_dir: cmd.data_dir,
        heartbeat_interval: Duration::from_secs(cmd.heartbeat.max(1)),
    };
    let server = StorageServer::start(config).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutdown signal received, stopping storage node");
            Ok(())
        }
    }
}
