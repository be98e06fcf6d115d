//! Shared Postgres container harness for `broker-postgres` integration
//! tests. One container is started and migrated once per test binary and
//! reused by every test; each test gets its own connection pool.

use broker_postgres::PgStore;
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct SharedInfra {
    db_url: String,
    _container: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedInfra> = OnceCell::const_new();

async fn shared_infra() -> &'static SharedInfra {
    SHARED_INFRA
        .get_or_init(|| async {
            let container = Postgres::default()
                .start()
                .await
                .expect("failed to start postgres container");
            let host = container.get_host().await.expect("container host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("container port");
            let db_url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

            let pool = PgPool::connect(&db_url).await.expect("connect for migration");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("run migrations");
            pool.close().await;

            SharedInfra {
                db_url,
                _container: container,
            }
        })
        .await
}

/// A fresh `PgStore` over the shared, already-migrated container.
pub async fn test_store() -> PgStore {
    let infra = shared_infra().await;
    let pool = PgPool::connect(&infra.db_url).await.expect("connect test pool");
    PgStore::new(pool)
}
