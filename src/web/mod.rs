//! HTTP API.

pub mod error;
pub mod middleware;
pub mod prices;
pub mod routes;
pub mod status;

pub use routes::*;

#[cfg(test)]
pub(crate) mod testing {
    //! Router harness backed by in-memory stores.

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::data::memory::{MemoryCatalog, MemoryKv};
    use crate::data::models::{Ingredient, Vendor};
    use crate::refresh::orchestrator::testing::*;
    use crate::refresh::pacer::testing::CountingPace;
    use crate::refresh::status::StatusStore;
    use crate::refresh::{HEARTBEAT_INTERVAL, RefreshBackends, RefreshService, RefreshSettings};
    use crate::state::{AppState, ServiceStatusRegistry};
    use crate::web::create_router;

    pub struct TestApp {
        pub router: Router,
        pub state: AppState,
        pub kv: Arc<MemoryKv>,
    }

    impl TestApp {
        /// Milk at Walmart (no results) and Aldi ($2.99/gallon).
        pub fn configured() -> Self {
            Self::build(RefreshBackends {
                search: Some(Arc::new(ScriptedSearch::new().on(
                    "Aldi",
                    SearchScript::Hits(vec![hit("Aldi milk", "$2.99 per gallon")]),
                ))),
                extractor: Some(Arc::new(ScriptedExtractor::new().on(
                    "Milk",
                    "Aldi",
                    ExtractScript::Price(2.99, Some("gallon")),
                ))),
            })
        }

        pub fn unconfigured() -> Self {
            Self::build(RefreshBackends::default())
        }

        fn build(backends: RefreshBackends) -> Self {
            let kv = Arc::new(MemoryKv::new());
            let catalog = Arc::new(MemoryCatalog::new(
                vec![Ingredient {
                    id: 1,
                    name: "Milk".into(),
                    unit: "gallon".into(),
                }],
                vec![
                    Vendor {
                        id: 10,
                        name: "Walmart".into(),
                    },
                    Vendor {
                        id: 11,
                        name: "Aldi".into(),
                    },
                ],
            ));
            let refresh = RefreshService::new(
                StatusStore::new(kv.clone()),
                catalog.clone(),
                backends,
                Arc::new(CountingPace::default()),
                RefreshSettings {
                    cooldown: Duration::from_secs(24 * 60 * 60),
                    stale_after: Duration::from_secs(30 * 60),
                    heartbeat_every: HEARTBEAT_INTERVAL,
                },
            );
            // Never connects unless a handler touches the database.
            let db_pool = PgPoolOptions::new()
                .connect_lazy("postgres://sprout@localhost/sprout_test")
                .unwrap();
            let state = AppState::new(db_pool, catalog, refresh, ServiceStatusRegistry::new());
            Self {
                router: create_router(state.clone()),
                state,
                kv,
            }
        }
    }

    /// Send one request and decode the JSON body (`Null` when empty).
    pub async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
