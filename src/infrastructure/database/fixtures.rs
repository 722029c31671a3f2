//! Throw-away SQLite databases for tests

use std::path::{Path, PathBuf};

use sea_orm::{ConnectionTrait, Database};

/// Shape of Apple's AssetCache metrics table (trimmed to a few columns).
pub(crate) const CREATE_ZMETRIC: &str = "CREATE TABLE ZMETRIC (
    Z_PK INTEGER PRIMARY KEY,
    ZREQUESTSFROMCLIENT INTEGER,
    ZBYTESDROPPED INTEGER,
    ZBYTESFROMCACHETOCLIENT INTEGER,
    ZCACHESTATUS TEXT,
    ZCREATIONDATE REAL
)";

/// Two samples; the second one (Z_PK = 2) is the most recent.
pub(crate) const INSERT_TWO_SAMPLES: &[&str] = &[
    "INSERT INTO ZMETRIC VALUES (1, 100, 0, 5000, 'true', 712799970.0)",
    "INSERT INTO ZMETRIC VALUES (2, 120, NULL, 6144, 'false', 712800000.0)",
];

/// Create `name` inside `dir` and run `statements` against it.
pub(crate) async fn sqlite_file(dir: &Path, name: &str, statements: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let db = Database::connect(format!("sqlite://{}?mode=rwc", path.display()))
        .await
        .expect("create fixture database");
    for sql in statements {
        db.execute_unprepared(sql).await.expect("run fixture statement");
    }
    db.close().await.expect("close fixture database");
    path
}

/// Metrics database with [`CREATE_ZMETRIC`] and [`INSERT_TWO_SAMPLES`].
pub(crate) async fn metrics_db(dir: &Path) -> PathBuf {
    let mut statements = vec![CREATE_ZMETRIC];
    statements.extend_from_slice(INSERT_TWO_SAMPLES);
    sqlite_file(dir, "Metrics.db", &statements).await
}
