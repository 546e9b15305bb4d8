//! Multi-tenant request handling with durable providers.
//!
//! Each incoming request gets its own context id. A strategy maps every
//! request of a tenant onto one durable context, so tenant-wide state is
//! built once per tenant while per-request state stays per request.
//!
//! Run with `RUST_LOG=ferrous_inject=trace cargo run --example multi_tenant`.

use ferrous_inject::{
    AnyArc, Container, ContextId, ContextIdResolver, ContextIdStrategy, DiResult, ModuleDefinition, Provider,
    Resolver, Scope, Token, REQUEST,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct IncomingRequest {
    tenant: String,
    path: String,
}

#[derive(Default)]
struct PerTenant {
    contexts: Mutex<HashMap<String, ContextId>>,
}

impl ContextIdStrategy for PerTenant {
    fn attach(&self, _context_id: &ContextId, request: &AnyArc) -> Option<ContextIdResolver> {
        let tenant = request.downcast_ref::<IncomingRequest>()?.tenant.clone();
        let durable = self.contexts.lock().entry(tenant.clone()).or_default().clone();
        Some(ContextIdResolver::durable(durable).with_payload(tenant))
    }
}

/// Tenant-wide connection settings, built once per tenant.
struct TenantDatabase {
    tenant: String,
    serial: u64,
}

/// Per-request handler.
struct Handler {
    db: Arc<TenantDatabase>,
    path: String,
}

fn data_module(connections: Arc<AtomicU64>) -> ModuleDefinition {
    ModuleDefinition::new("DataModule")
        .provider(
            Provider::factory(Token::of::<TenantDatabase>(), move |deps| {
                let connections = connections.clone();
                async move {
                    let tenant = deps.get::<String>(0)?;
                    Ok(TenantDatabase {
                        tenant: tenant.to_string(),
                        serial: connections.fetch_add(1, Ordering::SeqCst),
                    })
                }
            })
            .inject(REQUEST)
            .scope(Scope::Request)
            .durable(),
        )
        .export(Token::of::<TenantDatabase>())
}

fn app_module() -> ModuleDefinition {
    ModuleDefinition::new("AppModule").import("DataModule").controller(
        Provider::class::<Handler, _>(|deps| {
            let request = deps.get::<IncomingRequest>(1)?;
            Ok(Handler {
                db: deps.get::<TenantDatabase>(0)?,
                path: request.path.clone(),
            })
        })
        .inject(Token::of::<TenantDatabase>())
        .inject(REQUEST)
        .scope(Scope::Request),
    )
}

#[tokio::main]
async fn main() -> DiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let connections = Arc::new(AtomicU64::new(0));
    let container = Container::builder(app_module())
        .declare(data_module(connections.clone()))
        .context_id_strategy(PerTenant::default())
        .build()
        .await?;

    let requests = [
        ("acme", "/orders"),
        ("globex", "/invoices"),
        ("acme", "/customers"),
        ("acme", "/orders/7"),
    ];

    for (tenant, path) in requests {
        let context = container.context_ids().for_request(IncomingRequest {
            tenant: tenant.to_string(),
            path: path.to_string(),
        });
        let handler = container
            .resolve::<Handler>(&Token::of::<Handler>(), Some(&context))
            .await?;
        println!(
            "{:<8} {:<14} db #{} ({})",
            tenant, handler.path, handler.db.serial, handler.db.tenant
        );
    }

    println!("tenant databases created: {}", connections.load(Ordering::SeqCst));

    for descriptor in container.descriptors() {
        println!(
            "{}::{} scope={:?} durable={}",
            descriptor.module, descriptor.name, descriptor.scope, descriptor.is_tree_durable
        );
    }

    container.close().await;
    Ok(())
}
