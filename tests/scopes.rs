use ferrous_inject::{
    Container, ContainerOptions, DiError, InquirerId, ModuleDefinition, Provider, Resolver, Scope, Token, REQUEST,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct RequestState {
    id: usize,
}

struct Config;

struct Handler {
    state: Arc<RequestState>,
}

fn request_module(counter: Arc<AtomicUsize>) -> ModuleDefinition {
    ModuleDefinition::new("App")
        .provider(Provider::value(Token::of::<Config>(), Config))
        .provider(
            Provider::class::<RequestState, _>(move |_| {
                Ok(RequestState {
                    id: counter.fetch_add(1, Ordering::SeqCst) + 1,
                })
            })
            .scope(Scope::Request),
        )
        // Declared singleton, but depends on a request-scoped provider
        .provider(
            Provider::class::<Handler, _>(|deps| {
                Ok(Handler {
                    state: deps.get::<RequestState>(0)?,
                })
            })
            .inject(Token::of::<RequestState>()),
        )
}

// ===== Request scope =====

#[tokio::test]
async fn test_request_scope_isolated_per_context() {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = Container::builder(request_module(counter.clone())).build().await.unwrap();
    let token = Token::of::<RequestState>();

    let first = container.context_ids().create();
    let second = container.context_ids().create();

    let a1 = container.resolve::<RequestState>(&token, Some(&first)).await.unwrap();
    let a2 = container.resolve::<RequestState>(&token, Some(&first)).await.unwrap();
    let b = container.resolve::<RequestState>(&token, Some(&second)).await.unwrap();

    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_request_scope_propagates_to_consumers() {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = Container::builder(request_module(counter)).build().await.unwrap();

    assert!(!container.is_dependency_tree_static(&Token::of::<Handler>()).unwrap());
    assert!(container.is_dependency_tree_static(&Token::of::<Config>()).unwrap());

    let first = container.context_ids().create();
    let second = container.context_ids().create();
    let token = Token::of::<Handler>();

    let h1 = container.resolve::<Handler>(&token, Some(&first)).await.unwrap();
    let h1_again = container.resolve::<Handler>(&token, Some(&first)).await.unwrap();
    let h2 = container.resolve::<Handler>(&token, Some(&second)).await.unwrap();

    assert!(Arc::ptr_eq(&h1, &h1_again));
    assert!(!Arc::ptr_eq(&h1, &h2));
    assert_ne!(h1.state.id, h2.state.id);

    let state = container.resolve::<RequestState>(&Token::of::<RequestState>(), Some(&first)).await.unwrap();
    assert!(Arc::ptr_eq(&h1.state, &state));
}

#[tokio::test]
async fn test_request_instances_live_in_their_context() {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = Container::builder(request_module(counter)).build().await.unwrap();
    let context = container.context_ids().create();
    let token = Token::of::<Handler>();

    assert!(container.instance_in(&token, &context).is_none());
    container.resolve::<Handler>(&token, Some(&context)).await.unwrap();
    assert!(container.instance_in(&token, &context).is_some());
    // Handler and RequestState
    assert_eq!(context.instance_count(), 2);
}

#[tokio::test]
async fn test_get_rejects_request_scoped_trees() {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = Container::builder(request_module(counter)).build().await.unwrap();

    let err = container.get_required::<Handler>().await.err().unwrap();
    assert!(matches!(err, DiError::InvalidScope { ref token } if token == "Handler"));
}

#[tokio::test]
async fn test_eager_bootstrap_skips_request_scoped_providers() {
    let counter = Arc::new(AtomicUsize::new(0));
    let _container = Container::builder(request_module(counter.clone())).build().await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

// ===== Transient scope =====

struct Scratch {
    id: usize,
}

struct Left {
    scratch: Arc<Scratch>,
}

struct Right {
    scratch: Arc<Scratch>,
}

fn transient_module(counter: Arc<AtomicUsize>) -> ModuleDefinition {
    ModuleDefinition::new("App")
        .provider(
            Provider::class::<Scratch, _>(move |_| {
                Ok(Scratch {
                    id: counter.fetch_add(1, Ordering::SeqCst),
                })
            })
            .scope(Scope::Transient),
        )
        .provider(
            Provider::class::<Left, _>(|deps| {
                Ok(Left {
                    scratch: deps.get::<Scratch>(0)?,
                })
            })
            .inject(Token::of::<Scratch>()),
        )
        .provider(
            Provider::class::<Right, _>(|deps| {
                Ok(Right {
                    scratch: deps.get::<Scratch>(0)?,
                })
            })
            .inject(Token::of::<Scratch>()),
        )
}

#[tokio::test]
async fn test_transient_instance_per_inquirer() {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = Container::builder(transient_module(counter.clone())).build().await.unwrap();

    let left = container.get_required::<Left>().await.unwrap();
    let right = container.get_required::<Right>().await.unwrap();
    assert!(!Arc::ptr_eq(&left.scratch, &right.scratch));
    assert_ne!(left.scratch.id, right.scratch.id);

    // Singleton consumers keep their transient
    let left_again = container.get_required::<Left>().await.unwrap();
    assert!(Arc::ptr_eq(&left.scratch, &left_again.scratch));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_transient_fresh_for_every_external_resolve() {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = Container::builder(transient_module(counter))
        .options(ContainerOptions::default().lazy())
        .build()
        .await
        .unwrap();
    let token = Token::of::<Scratch>();

    let a = container.resolve::<Scratch>(&token, None).await.unwrap();
    let b = container.resolve::<Scratch>(&token, None).await.unwrap();
    assert!(!Arc::ptr_eq(&a, &b));

    let context = container.context_ids().create();
    let c = container.resolve::<Scratch>(&token, Some(&context)).await.unwrap();
    let d = container.resolve::<Scratch>(&token, Some(&context)).await.unwrap();
    assert!(!Arc::ptr_eq(&c, &d));
}

#[tokio::test]
async fn test_transient_reused_for_same_inquirer_and_context() {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = Container::builder(transient_module(counter)).build().await.unwrap();
    let token = Token::of::<Scratch>();
    let context = container.context_ids().create();
    let inquirer = InquirerId::external();

    let a = container.resolve_as(&token, &context, inquirer).await.unwrap();
    let b = container.resolve_as(&token, &context, inquirer).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let other = container.resolve_as(&token, &context, InquirerId::external()).await.unwrap();
    assert!(!Arc::ptr_eq(&a, &other));
}

#[tokio::test]
async fn test_get_rejects_transient_providers() {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = Container::builder(transient_module(counter)).build().await.unwrap();

    let err = container.get_required::<Scratch>().await.err().unwrap();
    assert!(matches!(err, DiError::InvalidScope { .. }));
}

// ===== REQUEST payload =====

struct Incoming {
    user: &'static str,
}

fn greeting_module() -> ModuleDefinition {
    ModuleDefinition::new("App").provider(
        Provider::factory("GREETING", |deps| async move {
            let request = deps.get::<Incoming>(0)?;
            Ok(format!("hello {}", request.user))
        })
        .inject(REQUEST),
    )
}

#[tokio::test]
async fn test_request_token_resolves_to_payload() {
    let container = Container::builder(greeting_module()).build().await.unwrap();
    let token = Token::named("GREETING");

    let ann = container.context_ids().for_request(Incoming { user: "ann" });
    let bob = container.context_ids().for_request(Incoming { user: "bob" });

    let a = container.resolve::<String>(&token, Some(&ann)).await.unwrap();
    let b = container.resolve::<String>(&token, Some(&bob)).await.unwrap();
    assert_eq!(a.as_str(), "hello ann");
    assert_eq!(b.as_str(), "hello bob");
}

#[tokio::test]
async fn test_request_token_makes_consumer_request_scoped() {
    let container = Container::builder(greeting_module()).build().await.unwrap();

    assert!(!container.is_dependency_tree_static(&Token::named("GREETING")).unwrap());
    let err = container.get::<String>(&Token::named("GREETING")).await.unwrap_err();
    assert!(matches!(err, DiError::InvalidScope { .. }));
}

#[tokio::test]
async fn test_request_token_without_payload_fails() {
    let container = Container::builder(greeting_module()).build().await.unwrap();
    let context = container.context_ids().create();

    let err = container
        .resolve::<String>(&Token::named("GREETING"), Some(&context))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no request payload"));
}
