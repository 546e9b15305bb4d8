use ferrous_inject::{Container, ContainerOptions, ModuleDefinition, Provider, Resolver, Scope, Token};
use parking_lot::Mutex;
use std::sync::Arc;

struct Pool;
struct Repository;
struct Session;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn teardown_module(log: Log) -> ModuleDefinition {
    let (pool_log, repo_log, session_log) = (log.clone(), log.clone(), log);
    ModuleDefinition::new("App")
        .provider(Provider::class::<Pool, _>(|_| Ok(Pool)).on_destroy(move |_pool: Arc<Pool>| {
            let log = pool_log.clone();
            async move { log.lock().push("pool") }
        }))
        .provider(
            Provider::class::<Repository, _>(|deps| {
                deps.get::<Pool>(0)?;
                Ok(Repository)
            })
            .inject(Token::of::<Pool>())
            .on_destroy(move |_repository: Arc<Repository>| {
                let log = repo_log.clone();
                async move { log.lock().push("repository") }
            }),
        )
        .provider(
            Provider::class::<Session, _>(|_| Ok(Session))
                .scope(Scope::Request)
                .on_destroy(move |_session: Arc<Session>| {
                    let log = session_log.clone();
                    async move { log.lock().push("session") }
                }),
        )
}

#[tokio::test]
async fn test_close_runs_hooks_in_reverse_creation_order() {
    let log: Log = Arc::default();
    let container = Container::builder(teardown_module(log.clone())).build().await.unwrap();

    container.close().await;
    assert_eq!(*log.lock(), vec!["repository", "pool"]);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let log: Log = Arc::default();
    let container = Container::builder(teardown_module(log.clone())).build().await.unwrap();

    container.close().await;
    container.close().await;
    assert_eq!(log.lock().len(), 2);
}

#[tokio::test]
async fn test_close_only_tears_down_created_singletons() {
    let log: Log = Arc::default();
    let container = Container::builder(teardown_module(log.clone()))
        .options(ContainerOptions::default().lazy())
        .build()
        .await
        .unwrap();

    // Nothing created yet
    container.close().await;
    assert!(log.lock().is_empty());

    container.get_required::<Pool>().await.unwrap();
    container.close().await;
    assert_eq!(*log.lock(), vec!["pool"]);
}

#[tokio::test]
async fn test_request_scoped_instances_have_no_container_teardown() {
    let log: Log = Arc::default();
    let container = Container::builder(teardown_module(log.clone())).build().await.unwrap();

    let context = container.context_ids().create();
    container.resolve::<Session>(&Token::of::<Session>(), Some(&context)).await.unwrap();
    drop(context);

    container.close().await;
    assert!(!log.lock().contains(&"session"));
}

#[tokio::test]
async fn test_request_instances_released_with_context() {
    let container = Container::builder(teardown_module(Arc::default())).build().await.unwrap();

    let context = container.context_ids().create();
    let session = container.resolve::<Session>(&Token::of::<Session>(), Some(&context)).await.unwrap();
    assert_eq!(Arc::strong_count(&session), 2);

    drop(context);
    assert_eq!(Arc::strong_count(&session), 1);
}
