// src/cli/migrate.rs — Database migration command
//
// Migrations run automatically on open. This shows the applied version or
// rolls the schema back to empty.

use crate::memory::schema;

pub fn run_migrate(status_only: bool, rollback: bool) -> anyhow::Result<()> {
    let db_path = crate::infra::paths::db_path();

    if !db_path.exists() {
        println!("No database found at: {}", db_path.display());
        return Ok(());
    }

    let conn = rusqlite::Connection::open(&db_path)?;

    if rollback {
        schema::rollback_to(&conn, 0)?;
        println!("Rolled back all migrations.");
    } else if !status_only {
        schema::run_migrations(&conn)?;
    }

    println!("Database:  {}", db_path.display());
    println!("Schema:    v{}", schema::current_version(&conn)?);
    Ok(())
}
