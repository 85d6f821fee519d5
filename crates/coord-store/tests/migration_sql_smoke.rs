//! Runs the migrations against a real database to catch SQL errors that
//! unit tests, which never touch Postgres, cannot.

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL or DATABASE_URL"]
async fn migrations_apply_cleanly() {
    let url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("set TEST_DATABASE_URL or DATABASE_URL to run this test");

    let pool = sqlx::PgPool::connect(&url)
        .await
        .expect("failed to connect to database");

    coord_store::run_migrations(&pool)
        .await
        .expect("migrations failed to apply");
}
