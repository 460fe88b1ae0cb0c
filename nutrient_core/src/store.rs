//! Schema store backed by a pooled SQLite database.
//!
//! The pool is created once at startup with [`Store::open`] and released
//! with [`Store::close`]. All query and ingestion code borrows connections
//! from it instead of opening its own.

use crate::{Food, FoodNutrient, Nutrient, Result, TableCounts};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

const CONNECTION_TIMEOUT_SECONDS: u64 = 10;

/// Tables replaced wholesale by a bulk import
pub(crate) const FOOD_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS food (
        fdc_id INTEGER PRIMARY KEY,
        description TEXT NOT NULL,
        data_type TEXT NOT NULL DEFAULT '',
        publication_date TEXT,
        food_code INTEGER
    );

    CREATE TABLE IF NOT EXISTS nutrient (
        id INTEGER,
        name TEXT NOT NULL,
        unit_name TEXT NOT NULL DEFAULT '',
        nutrient_nbr INTEGER PRIMARY KEY,
        rank REAL
    );

    CREATE TABLE IF NOT EXISTS food_nutrient (
        fdc_id INTEGER NOT NULL,
        nutrient_id INTEGER NOT NULL,
        amount REAL NOT NULL DEFAULT 0 CHECK (amount >= 0),
        UNIQUE (fdc_id, nutrient_id)
    );";

const SAVED_NUTRIENTS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS saved_nutrients (
        name TEXT NOT NULL,
        nutrient_id INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_saved_nutrients_name ON saved_nutrients(name);";

pub(crate) const DROP_FOOD_TABLES: &str = "
    DROP TABLE IF EXISTS food_nutrient;
    DROP TABLE IF EXISTS nutrient;
    DROP TABLE IF EXISTS food;";

pub(crate) const INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_food_nutrient_fdc_id ON food_nutrient(fdc_id);
    CREATE INDEX IF NOT EXISTS idx_food_description_lower ON food(lower(description));";

/// Unicode lowercase of its text argument; SQLite's own `lower()` folds ASCII only
const FOLD_CASE: &str = "fold_case";

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_CASE,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

/// Handle to the nutrient database
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    /// Open (creating if needed) a database file with a pool of `pool_size`
    pub fn open(path: &Path, pool_size: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;")?;
            register_functions(conn)
        });
        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECONDS))
            .build(manager)?;

        tracing::info!("Opened database {:?} (pool size {})", path, pool_size.max(1));
        Ok(Self { pool })
    }

    /// Open a private in-memory database
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool
    /// holds exactly one connection. Callers must not hold two at once.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| register_functions(conn));
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .connection_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECONDS))
            .build(manager)?;
        Ok(Self { pool })
    }

    /// Borrow a connection from the pool
    pub(crate) fn conn(&self) -> Result<PooledConn> {
        Ok(self.pool.get()?)
    }

    /// Create all tables and indexes that don't exist yet
    pub fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(FOOD_TABLES)?;
        conn.execute_batch(SAVED_NUTRIENTS_TABLE)?;
        conn.execute_batch(INDEXES)?;
        tracing::debug!("Schema initialized");
        Ok(())
    }

    /// Append foods, nutrients and facts in a single transaction
    ///
    /// Rows already present (same food id, nutrient number, or
    /// food/nutrient pair) are skipped. Returns the rows inserted per table.
    pub fn append_batch(
        &self,
        foods: &[Food],
        nutrients: &[Nutrient],
        facts: &[FoodNutrient],
    ) -> Result<TableCounts> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let inserted = TableCounts {
            foods: insert_foods(&tx, foods)?,
            nutrients: insert_nutrients(&tx, nutrients)?,
            facts: insert_facts(&tx, facts)?,
        };
        tx.commit()?;
        Ok(inserted)
    }

    /// Release every pooled connection
    pub fn close(self) {
        let state = self.pool.state();
        tracing::debug!(
            "Closing database pool ({} connections, {} idle)",
            state.connections,
            state.idle_connections
        );
        drop(self.pool);
    }
}

pub(crate) fn insert_foods(conn: &Connection, foods: &[Food]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO food (fdc_id, description, data_type, publication_date, food_code)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut inserted = 0;
    for food in foods {
        inserted += stmt.execute(params![
            food.fdc_id,
            food.description,
            food.data_type,
            food.publication_date,
            food.food_code,
        ])?;
    }
    Ok(inserted)
}

pub(crate) fn insert_nutrients(conn: &Connection, nutrients: &[Nutrient]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO nutrient (id, name, unit_name, nutrient_nbr, rank)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut inserted = 0;
    for nutrient in nutrients {
        inserted += stmt.execute(params![
            nutrient.id,
            nutrient.name,
            nutrient.unit_name,
            nutrient.nutrient_nbr,
            nutrient.rank,
        ])?;
    }
    Ok(inserted)
}

pub(crate) fn insert_facts(conn: &Connection, facts: &[FoodNutrient]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO food_nutrient (fdc_id, nutrient_id, amount) VALUES (?1, ?2, ?3)",
    )?;
    let mut inserted = 0;
    for fact in facts {
        // Negative amounts would violate the CHECK constraint
        inserted += stmt.execute(params![fact.fdc_id, fact.nutrient_id, fact.amount.max(0.0)])?;
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn food(fdc_id: i64, description: &str) -> Food {
        Food {
            fdc_id,
            description: description.into(),
            data_type: "foundation_food".into(),
            publication_date: Some("2019-04-01".into()),
            food_code: None,
        }
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        crate::logging::init_test();
        let store = Store::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store.init_schema().unwrap();
        assert_eq!(store.table_counts().unwrap(), TableCounts::default());
    }

    #[test]
    fn test_append_batch_skips_duplicates() {
        let store = Store::open_in_memory().unwrap();
        store.init_schema().unwrap();

        let foods = vec![food(1, "Apple"), food(2, "Banana")];
        let facts = vec![
            FoodNutrient { fdc_id: 1, nutrient_id: 203, amount: 0.3 },
            FoodNutrient { fdc_id: 1, nutrient_id: 203, amount: 0.3 },
        ];

        let inserted = store.append_batch(&foods, &[], &facts).unwrap();
        assert_eq!(inserted, TableCounts { foods: 2, nutrients: 0, facts: 1 });
        let inserted = store.append_batch(&foods, &[], &facts).unwrap();
        assert_eq!(inserted, TableCounts::default());

        let counts = store.table_counts().unwrap();
        assert_eq!(counts.foods, 2);
        assert_eq!(counts.facts, 1);
    }

    #[test]
    fn test_negative_amount_is_clamped() {
        let store = Store::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store
            .append_batch(
                &[food(7, "Kale")],
                &[],
                &[FoodNutrient { fdc_id: 7, nutrient_id: 301, amount: -4.0 }],
            )
            .unwrap();

        let conn = store.conn().unwrap();
        let amount: f64 = conn
            .query_row("SELECT amount FROM food_nutrient WHERE fdc_id = 7", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(amount, 0.0);
    }

    #[test]
    fn test_file_store_shares_data_across_connections() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("db").join("nutrients.db");

        let store = Store::open(&path, 2).unwrap();
        store.init_schema().unwrap();
        store.append_batch(&[food(1, "Apple")], &[], &[]).unwrap();

        let first = store.conn().unwrap();
        let second = store.conn().unwrap();
        let count: i64 = second
            .query_row("SELECT count(*) FROM food", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        drop(first);
        drop(second);

        store.close();
        assert!(path.exists());
    }

    #[test]
    fn test_fold_case_lowers_non_ascii() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn().unwrap();
        let folded: String = conn
            .query_row("SELECT fold_case('CRÈME FRAÎCHE')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, "crème fraîche");

        let builtin: String = conn
            .query_row("SELECT lower('CRÈME')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(builtin, "crÈme");
    }
}
