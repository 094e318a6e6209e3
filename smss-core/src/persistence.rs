//! SQLite gateway to the Miscreated server database.
//!
//! The schema belongs to the game server; this module only reads positions
//! and clan membership and writes one integer column, `AbandonTimer`:
//!
//! ```sql
//! Structures  (StructureID, AccountID, ClassName, PosX, PosY, AbandonTimer, ...)
//! Vehicles    (VehicleID, PosX, PosY, AbandonTimer, ...)
//! ClanMembers (ClanID, AccountID, ...)
//! ```
//!
//! Id-list filters are bound as a single `rarray()` parameter, so one
//! statement covers any number of ids and no SQL is ever built by string
//! interpolation. An empty id list is rejected before a statement is
//! prepared.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Params, Row};
use tracing::debug;

use crate::error::{Result, SmssError};
use crate::types::{
    AccountId, Base, Category, ClanId, EntityId, OwnerId, Position, Tent, Vehicle,
    PLOT_SIGN_CLASS, STEAM64_OFFSET,
};

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

const BASES_SQL: &str = "SELECT (AccountID + ?1) AS Owner,
        ROUND(PosX, 5) AS PosX,
        ROUND(PosY, 5) AS PosY
    FROM Structures
    WHERE ClassName = ?2";

const TENTS_SQL: &str = "SELECT StructureID,
        ROUND(PosX, 5) AS PosX,
        ROUND(PosY, 5) AS PosY
    FROM Structures
    WHERE ClassName LIKE '%tent%'";

const VEHICLES_SQL: &str = "SELECT VehicleID,
        ROUND(PosX, 5) AS PosX,
        ROUND(PosY, 5) AS PosY
    FROM Vehicles";

const CLAN_MEMBERS_SQL: &str = "SELECT (AccountID + ?1) AS SteamID
    FROM ClanMembers
    WHERE ClanID IN rarray(?2)";

const SERVER_ID_SQL: &str =
    "SELECT GameServerID FROM Characters ORDER BY CharacterID LIMIT 1";

// ---------------------------------------------------------------------------
// TimerStore
// ---------------------------------------------------------------------------

/// The store operations the clan resolver and timer engine depend on.
///
/// Every write returns the number of rows changed. Targeted writes reject an
/// empty id list with [`SmssError::EmptyFilter`].
pub trait TimerStore {
    /// Every base, with owner and rounded position.
    ///
    /// # Errors
    /// Returns [`SmssError::Database`] if the query fails.
    fn bases(&self) -> Result<Vec<Base>>;

    /// Every structure whose class name contains "tent" (case-insensitive).
    ///
    /// # Errors
    /// Returns [`SmssError::Database`] if the query fails.
    fn tents(&self) -> Result<Vec<Tent>>;

    /// Every vehicle.
    ///
    /// # Errors
    /// Returns [`SmssError::Database`] if the query fails.
    fn vehicles(&self) -> Result<Vec<Vehicle>>;

    /// Owner ids of every member of any of `clans`, in store order.
    ///
    /// # Errors
    /// Returns [`SmssError::EmptyFilter`] for an empty clan list, or
    /// [`SmssError::Database`] if the query fails.
    fn clan_members(&self, clans: &[ClanId]) -> Result<Vec<OwnerId>>;

    /// Set the abandon timer of every entity in a category.
    ///
    /// # Errors
    /// Returns [`SmssError::Database`] if the statement fails.
    fn reset_all(&self, category: Category, seconds: i64) -> Result<usize>;

    /// Set the abandon timer of the bases placed by `accounts`.
    ///
    /// # Errors
    /// Returns [`SmssError::EmptyFilter`] or [`SmssError::Database`].
    fn reset_base_accounts(&self, accounts: &[AccountId], seconds: i64) -> Result<usize>;

    /// Set the abandon timer of the structures with the given ids.
    ///
    /// # Errors
    /// Returns [`SmssError::EmptyFilter`] or [`SmssError::Database`].
    fn reset_structures(&self, ids: &[EntityId], seconds: i64) -> Result<usize>;

    /// Set the abandon timer of the vehicles with the given ids.
    ///
    /// # Errors
    /// Returns [`SmssError::EmptyFilter`] or [`SmssError::Database`].
    fn reset_vehicles(&self, ids: &[EntityId], seconds: i64) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// Handle to an existing server database.
///
/// # Usage
///
/// ```no_run
/// # use smss_core::persistence::{SqliteStore, TimerStore};
/// if let Some(store) = SqliteStore::open_existing("MiscreatedServer/miscreated.db")? {
///     let bases = store.bases()?;
///     println!("{} bases", bases.len());
/// }
/// # Ok::<(), smss_core::error::SmssError>(())
/// ```
pub struct SqliteStore {
    conn: Connection,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open the database at `path` if it exists.
    ///
    /// Returns `Ok(None)` when the file is absent: the server has not
    /// created its database yet, so there is nothing to maintain. The file
    /// is never created here.
    ///
    /// # Errors
    ///
    /// Returns [`SmssError::Database`] if the file exists but cannot be
    /// opened.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let db_path = path.as_ref().to_path_buf();
        if !db_path.exists() {
            debug!(path = %db_path.display(), "Database not yet created");
            return Ok(None);
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Self::from_connection(conn, db_path).map(Some)
    }

    /// Open an in-memory database (useful for tests and benches).
    ///
    /// # Errors
    ///
    /// Returns [`SmssError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> Result<Self> {
        rusqlite::vtab::array::load_module(&conn)?;
        Ok(Self { conn, db_path })
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Run a read query and map every row.
    ///
    /// # Errors
    ///
    /// Returns [`SmssError::Database`] if the query fails.
    pub fn query<T, P, F>(&self, sql: &str, params: P, mut map: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        debug!(sql, "Query");
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, |row| map(row))?;
        rows.collect::<rusqlite::Result<Vec<T>>>().map_err(SmssError::from)
    }

    /// Run one mutating statement and commit it.
    ///
    /// # Errors
    ///
    /// Returns [`SmssError::Database`] if the statement or the commit fails;
    /// nothing is committed in that case.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(sql, params)?;
        tx.commit()?;
        debug!(sql, rows = changed, "Statement committed");
        Ok(changed)
    }

    /// Run a multi-statement script.
    ///
    /// # Errors
    ///
    /// Returns [`SmssError::Database`] on SQLite failures.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        debug!(sql, "Script");
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// `GameServerID` of the first character, if any character exists.
    ///
    /// # Errors
    ///
    /// Returns [`SmssError::Database`] if the lookup fails.
    pub fn server_id(&self) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(SERVER_ID_SQL, [], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    /// Return the path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn reset_filtered(&self, sql: &str, what: &'static str, ids: &[i64], seconds: i64) -> Result<usize> {
        let ids = id_array(ids, what)?;
        debug!(what, ids = ?ids, "Resetting selected timers");
        self.execute(sql, params![seconds, ids])
    }
}

impl TimerStore for SqliteStore {
    fn bases(&self) -> Result<Vec<Base>> {
        self.query(BASES_SQL, params![STEAM64_OFFSET, PLOT_SIGN_CLASS], |row| {
            Ok(Base {
                owner: OwnerId(row.get(0)?),
                position: position(row)?,
            })
        })
    }

    fn tents(&self) -> Result<Vec<Tent>> {
        self.query(TENTS_SQL, [], |row| {
            Ok(Tent {
                id: EntityId(row.get(0)?),
                position: position(row)?,
            })
        })
    }

    fn vehicles(&self) -> Result<Vec<Vehicle>> {
        self.query(VEHICLES_SQL, [], |row| {
            Ok(Vehicle {
                id: EntityId(row.get(0)?),
                position: position(row)?,
            })
        })
    }

    fn clan_members(&self, clans: &[ClanId]) -> Result<Vec<OwnerId>> {
        let ids: Vec<i64> = clans.iter().map(|c| c.0).collect();
        let ids = id_array(&ids, "clan")?;
        self.query(CLAN_MEMBERS_SQL, params![STEAM64_OFFSET, ids], |row| {
            Ok(OwnerId(row.get(0)?))
        })
    }

    fn reset_all(&self, category: Category, seconds: i64) -> Result<usize> {
        match category {
            Category::Base => self.execute(
                "UPDATE Structures SET AbandonTimer = ?1 WHERE ClassName = ?2",
                params![seconds, PLOT_SIGN_CLASS],
            ),
            Category::Tent => self.execute(
                "UPDATE Structures SET AbandonTimer = ?1 WHERE ClassName LIKE '%tent%'",
                params![seconds],
            ),
            Category::Vehicle => {
                self.execute("UPDATE Vehicles SET AbandonTimer = ?1", params![seconds])
            }
        }
    }

    fn reset_base_accounts(&self, accounts: &[AccountId], seconds: i64) -> Result<usize> {
        let ids = id_array(&accounts.iter().map(|a| a.0).collect::<Vec<_>>(), "base account")?;
        debug!(accounts = ?ids, "Resetting base timers");
        self.execute(
            "UPDATE Structures SET AbandonTimer = ?1
             WHERE ClassName = ?2 AND AccountID IN rarray(?3)",
            params![seconds, PLOT_SIGN_CLASS, ids],
        )
    }

    fn reset_structures(&self, ids: &[EntityId], seconds: i64) -> Result<usize> {
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        self.reset_filtered(
            "UPDATE Structures SET AbandonTimer = ?1 WHERE StructureID IN rarray(?2)",
            "structure",
            &ids,
            seconds,
        )
    }

    fn reset_vehicles(&self, ids: &[EntityId], seconds: i64) -> Result<usize> {
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        self.reset_filtered(
            "UPDATE Vehicles SET AbandonTimer = ?1 WHERE VehicleID IN rarray(?2)",
            "vehicle",
            &ids,
            seconds,
        )
    }
}

/// Bind value for `rarray()`. Empty lists are refused.
fn id_array(ids: &[i64], what: &'static str) -> Result<Rc<Vec<Value>>> {
    if ids.is_empty() {
        return Err(SmssError::EmptyFilter { what });
    }
    Ok(Rc::new(ids.iter().copied().map(Value::from).collect()))
}

fn position(row: &Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position::new(row.get(1)?, row.get(2)?))
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Minimal copy of the server tables this crate touches.
#[cfg(test)]
pub(crate) const FIXTURE_SCHEMA: &str = "
    CREATE TABLE Structures (
        StructureID  INTEGER PRIMARY KEY,
        AccountID    INTEGER NOT NULL,
        ClassName    TEXT NOT NULL,
        PosX         REAL NOT NULL,
        PosY         REAL NOT NULL,
        AbandonTimer INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE Vehicles (
        VehicleID    INTEGER PRIMARY KEY,
        PosX         REAL NOT NULL,
        PosY         REAL NOT NULL,
        AbandonTimer INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE ClanMembers (
        ClanID    INTEGER NOT NULL,
        AccountID INTEGER NOT NULL
    );
    CREATE TABLE Characters (
        CharacterID  INTEGER PRIMARY KEY,
        AccountID    INTEGER NOT NULL,
        GameServerID INTEGER NOT NULL
    );
    CREATE TABLE ServerAccountData (
        AccountID INTEGER PRIMARY KEY,
        Guide00   TEXT,
        Guide01   TEXT
    );
";


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
