use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

use tollgate::admin_graphql;
use tollgate::admin_mutations::AdminContext;
use tollgate::authz::audit::{DatabaseAuditSink, FanoutAuditSink, TracingAuditSink};
use tollgate::authz::route_cache::CachedRouteTable;
use tollgate::authz::store::{AuditSink, RouteTable};
use tollgate::authz::web::AuthzHttpState;
use tollgate::authz::{AuthorizationGuard, RoleService};
use tollgate::storage::{SeaPrincipalStore, SeaRouteTable};
use tollgate::{jobs, seed, settings, storage, web};

#[derive(Parser, Debug)]
#[command(
    name = "tollgate",
    version,
    about = "Route-keyed authorization service"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await?;

    if settings.authz.seed_system_roles {
        seed::ensure_system_roles(&db).await.into_diagnostic()?;
    }

    // audit sinks: always log, optionally persist
    let mut sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingAuditSink)];
    if settings.audit.persist {
        let (sink, _writer) = DatabaseAuditSink::spawn(db.clone(), settings.audit.channel_capacity);
        sinks.push(Arc::new(sink));
    }
    let audit: Arc<dyn AuditSink> = Arc::new(FanoutAuditSink::new(sinks));

    // route table, optionally behind the TTL cache
    let route_table: Arc<dyn RouteTable> = Arc::new(SeaRouteTable::new(db.clone()));
    let route_cache = settings
        .authz
        .route_cache_ttl()
        .map(|ttl| {
            Arc::new(
                CachedRouteTable::new(route_table.clone(), ttl)
                    .with_max_entries(settings.authz.route_cache_max_entries),
            )
        });
    let routes: Arc<dyn RouteTable> = match &route_cache {
        Some(cache) => cache.clone(),
        None => route_table,
    };

    let guard = AuthorizationGuard::new(
        Arc::new(SeaPrincipalStore::new(db.clone())),
        routes,
        audit.clone(),
    )
    .with_slow_check_threshold(settings.authz.slow_check_threshold());
    let authz_state = AuthzHttpState::new(Arc::new(guard))
        .with_principal_header(&settings.authz.principal_header);

    let admin_schema = admin_graphql::build_admin_schema(
        db.clone(),
        RoleService::new(db.clone(), audit),
        AdminContext {
            retention_days: settings.audit.retention_days,
            route_cache,
        },
    );

    // background jobs
    let _scheduler = jobs::init_scheduler(db, settings.audit.retention_days).await?;

    // start web server
    web::serve(settings, authz_state, admin_schema).await?;
    Ok(())
}
