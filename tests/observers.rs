use ferrous_inject::{
    Container, ContainerOptions, ContextId, DiError, ModuleDefinition, Provider, ResolutionObserver, Resolver,
    Token, TracingObserver,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ResolutionObserver for Recorder {
    fn resolving(&self, token: &Token, _context: &ContextId) {
        self.events.lock().push(format!("resolving {}", token));
    }

    fn resolved(&self, token: &Token, _context: &ContextId, _duration: Duration) {
        self.events.lock().push(format!("resolved {}", token));
    }

    fn failed(&self, token: &Token, _context: &ContextId, _error: &DiError) {
        self.events.lock().push(format!("failed {}", token));
    }
}

struct Forward(Arc<Recorder>);

impl ResolutionObserver for Forward {
    fn resolving(&self, token: &Token, context: &ContextId) {
        self.0.resolving(token, context)
    }

    fn resolved(&self, token: &Token, context: &ContextId, duration: Duration) {
        self.0.resolved(token, context, duration)
    }

    fn failed(&self, token: &Token, context: &ContextId, error: &DiError) {
        self.0.failed(token, context, error)
    }
}

#[tokio::test]
async fn test_observer_sees_constructions_but_not_cache_hits() {
    let recorder = Arc::new(Recorder::default());
    let app = ModuleDefinition::new("App")
        .provider(Provider::value("PORT", 8080u16))
        .provider(Provider::factory("ADDR", |deps| async move { Ok(format!(":{}", deps.get::<u16>(0)?)) }).inject("PORT"));
    let container = Container::builder(app)
        .options(ContainerOptions::default().lazy())
        .observer(Forward(recorder.clone()))
        .build()
        .await
        .unwrap();

    container.get::<String>(&Token::named("ADDR")).await.unwrap();
    container.get::<String>(&Token::named("ADDR")).await.unwrap();

    assert_eq!(
        *recorder.events.lock(),
        vec!["resolving ADDR", "resolving PORT", "resolved PORT", "resolved ADDR"]
    );
}

#[tokio::test]
async fn test_observer_sees_failures() {
    let recorder = Arc::new(Recorder::default());
    let app = ModuleDefinition::new("App").provider(Provider::factory("BROKEN", |_| async {
        Err::<u8, _>(DiError::msg("boom"))
    }));
    let container = Container::builder(app)
        .options(ContainerOptions::default().lazy())
        .observer(Forward(recorder.clone()))
        .observer(TracingObserver::default())
        .build()
        .await
        .unwrap();

    assert!(container.get::<u8>(&Token::named("BROKEN")).await.is_err());
    assert_eq!(*recorder.events.lock(), vec!["resolving BROKEN", "failed BROKEN"]);
}
