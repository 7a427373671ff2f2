use tokio_postgres::NoTls;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let conn_str = std::env::var("PG_ADMIN_CONN")
        .unwrap_or_else(|_| "host=127.0.0.1 user=postgres dbname=postgres".into());

    println!("Connecting to Postgres to manage databases...");

    let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {}", e);
        }
    });

    let db_name = std::env::var("DB_NAME").unwrap_or_else(|_| "flexpass".into());

    let row = client
        .query_opt("SELECT 1 FROM pg_database WHERE datname = $1", &[&db_name])
        .await?;

    if row.is_some() {
        println!("Database '{}' already exists.", db_name);
        return Ok(());
    }

    if !is_valid_database_name(&db_name) {
        return Err(format!("Refusing to create database: invalid name '{}'", db_name).into());
    }

    let create_sql = format!("CREATE DATABASE \"{}\"", db_name);
    client.execute(create_sql.as_str(), &[]).await?;
    println!("Database '{}' created successfully.", db_name);

    Ok(())
}

fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_name_validation() {
        assert!(is_valid_database_name("flexpass"));
        assert!(is_valid_database_name("flexpass_test_1"));
        assert!(!is_valid_database_name(""));
        assert!(!is_valid_database_name("flex\"pass"));
        assert!(!is_valid_database_name("drop table; --"));
    }
}
