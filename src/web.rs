//! Process-level HTTP wiring: the public decision API and the admin GraphQL
//! API, each on its own listener.
use crate::admin_graphql::{self, AdminSchema};
use crate::authz::web::{self as authz_web, AuthzHttpState};
use crate::settings::Settings;
use miette::IntoDiagnostic;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

pub async fn serve(
    settings: Settings,
    authz_state: AuthzHttpState,
    admin_schema: AdminSchema,
) -> miette::Result<()> {
    let router = authz_web::router(authz_state).layer(TraceLayer::new_for_http());

    let public_addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    // Start admin GraphQL server on separate port
    let admin_addr: SocketAddr = format!("{}:{}", settings.server.host, settings.admin_port())
        .parse()
        .map_err(|e| miette::miette!("bad admin addr: {e}"))?;

    let admin_router = admin_graphql::router(admin_schema);

    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%admin_addr, "Admin GraphQL API listening");
    tracing::info!(
        "GraphQL Playground available at http://{}/admin/playground",
        admin_addr
    );

    let admin_server = tokio::spawn(async move { axum::serve(admin_listener, admin_router).await });

    let listener = tokio::net::TcpListener::bind(public_addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%public_addr, "Authorization API listening");

    tokio::select! {
        result = axum::serve(listener, router) => result.into_diagnostic()?,
        joined = admin_server => {
            joined
                .into_diagnostic()?
                .into_diagnostic()?;
            return Err(miette::miette!("admin server stopped unexpectedly"));
        }
    }
    Ok(())
}
