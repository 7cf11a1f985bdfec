use crate::usecase::ports::gateway::GatewayError;

/// Runs storage work on tokio's blocking pool so rusqlite never stalls the executor.
pub async fn run_blocking<F, T>(f: F) -> Result<T, GatewayError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| GatewayError::Join(err.to_string()))?
        .map_err(GatewayError::from)
}
