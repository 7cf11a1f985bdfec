use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use caredesk::config::{default_webview_data_dir, AppConfig};
use caredesk::domain::schema::registry::SchemaRegistry;
use caredesk::infra::sqlite::gateway::SqliteGateway;
use caredesk::infra::sqlite::schema::init_db;
use caredesk::ui::app::App;
use caredesk::ui::state::app_state::{install_app_context, start_panels, AppContext};
use caredesk::usecase::ports::gateway::Gateway;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().unwrap_or_else(|err| {
        warn!(error = %err, "failed to load config, using defaults");
        AppConfig::default()
    });
    let db_path = config.resolved_db_path()?;
    init_db(&db_path)?;
    info!(db = %db_path.display(), "database ready");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let registry = SchemaRegistry::with_builtin_resources();
    let gateway: Arc<dyn Gateway> = Arc::new(SqliteGateway::new(db_path.clone()));
    let panels = start_panels(
        runtime.handle(),
        &registry,
        gateway.clone(),
        &config.controller_settings(),
        config.page_size,
    );
    install_app_context(AppContext {
        runtime: runtime.handle().clone(),
        db_path,
        gateway,
        panels,
    })?;

    let webview_data_dir = default_webview_data_dir()?;

    dioxus::LaunchBuilder::desktop()
        .with_cfg(
            dioxus::desktop::Config::new()
                .with_window(dioxus::desktop::WindowBuilder::new().with_title("患儿入住管理"))
                .with_data_directory(webview_data_dir),
        )
        .launch(App);

    Ok(())
}
