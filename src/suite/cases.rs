//! 各エンジンに対して実行するCRUDテスト
//!
//! 各ケースは自分の接続を開き、成功時に閉じる。途中で失敗した場合は `Drop` で解放される。

use super::{RegistryError, TestRegistry};
use crate::config::ConnectionTarget;
use crate::crud::{Crud, Entity, Key, KeyKind, Record};
use crate::database::{engine_for, DatabaseConnection, DatabaseEngine, Value};
use crate::dialect::DialectProfile;
use anyhow::{ensure, Context};
use std::sync::Arc;

pub const USERS: Entity = Entity {
    table: "Users",
    schema: None,
    key: Some(Key {
        column: "Id",
        kind: KeyKind::Identity,
    }),
    columns: &["Name", "Age", "ScheduledDayOff"],
    readonly: &["CreatedDate"],
};

pub const CARS: Entity = Entity {
    table: "Car",
    schema: None,
    key: Some(Key {
        column: "CarId",
        kind: KeyKind::Identity,
    }),
    columns: &["Id", "Make", "Model"],
    readonly: &[],
};

pub const BIG_CARS: Entity = Entity {
    table: "BigCar",
    schema: None,
    key: Some(Key {
        column: "CarId",
        kind: KeyKind::Identity,
    }),
    columns: &["Make", "Model"],
    readonly: &[],
};

pub const CITIES: Entity = Entity {
    table: "City",
    schema: None,
    key: None,
    columns: &["Name", "Population"],
    readonly: &[],
};

pub const CAR_LOGS: Entity = Entity {
    table: "CarLog",
    schema: Some("Log"),
    key: Some(Key {
        column: "Id",
        kind: KeyKind::Identity,
    }),
    columns: &["LogNotes"],
    readonly: &[],
};

pub const STRANGE_COLUMN_NAMES: Entity = Entity {
    table: "StrangeColumnNames",
    schema: None,
    key: Some(Key {
        column: "ItemId",
        kind: KeyKind::Identity,
    }),
    columns: &["word", "Order", "Group"],
    readonly: &[],
};

pub const GUID_TESTS: Entity = Entity {
    table: "GUIDTest",
    schema: None,
    key: Some(Key {
        column: "Id",
        kind: KeyKind::Supplied,
    }),
    columns: &["name"],
    readonly: &[],
};

/// テスト対象データベースへの接続情報
pub struct CrudSuite {
    profile: &'static DialectProfile,
    connection_string: String,
    engine: Arc<dyn DatabaseEngine>,
}

impl CrudSuite {
    pub fn new(profile: &'static DialectProfile, connection_string: impl Into<String>) -> Self {
        Self {
            profile,
            connection_string: connection_string.into(),
            engine: engine_for(profile.dialect),
        }
    }

    pub fn for_target(profile: &'static DialectProfile, target: &ConnectionTarget) -> Self {
        Self::new(profile, target.database_url.clone())
    }

    pub fn profile(&self) -> &'static DialectProfile {
        self.profile
    }

    pub fn crud(&self) -> Crud {
        Crud::new(self.profile)
    }

    pub async fn connect(&self) -> anyhow::Result<Box<dyn DatabaseConnection>> {
        self.engine
            .connect(&self.connection_string)
            .await
            .with_context(|| format!("Cannot connect to the {} test database", self.profile.name))
    }

    /// 実行順に並んだテストケース
    pub fn registry() -> Result<TestRegistry<CrudSuite>, RegistryError> {
        crate::test_cases![
            insert_user,
            get_user,
            get_user_list,
            update_user,
            delete_user,
            get_users_paged,
            insert_car_with_non_key_id,
            insert_big_car_key_above_i32,
            insert_city_without_key,
            insert_and_get_with_schema,
            insert_and_update_strange_column_names,
            insert_and_get_guid_key,
        ]
    }
}

fn integer_key(key: Option<Value>) -> anyhow::Result<i64> {
    let key = key.context("insert returned no key")?;
    key.as_i64()
        .with_context(|| format!("generated key is not an integer: {:?}", key))
}

fn user(name: &str, age: i32) -> Record {
    Record::new().with("Name", name).with("Age", age)
}

async fn insert_user(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    let id = integer_key(crud.insert(conn.as_mut(), &USERS, &user("User", 10)).await?)?;
    ensure!(id > 0, "expected a positive key, got {}", id);
    ensure!(crud.record_count(conn.as_mut(), &USERS).await? >= 1);

    conn.close().await?;
    Ok(())
}

async fn get_user(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    let id = integer_key(crud.insert(conn.as_mut(), &USERS, &user("Get Me", 41)).await?)?;
    let record = crud
        .get(conn.as_mut(), &USERS, &Value::Int(id))
        .await?
        .context("inserted user not found")?;
    ensure!(record.get_str("Name") == Some("Get Me"));
    ensure!(record.get_i64("Age") == Some(41));
    ensure!(
        record.get("ScheduledDayOff").is_some_and(Value::is_null),
        "unset column should be NULL"
    );
    ensure!(
        record.get("CreatedDate").is_some_and(|v| !v.is_null()),
        "CreatedDate should be filled by its default"
    );

    let missing = crud.get(conn.as_mut(), &USERS, &Value::Int(-1)).await?;
    ensure!(missing.is_none());

    conn.close().await?;
    Ok(())
}

async fn get_user_list(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    for name in ["List C", "List A", "List B"] {
        crud.insert(conn.as_mut(), &USERS, &user(name, 77)).await?;
    }

    let list = crud
        .get_list(conn.as_mut(), &USERS, &[("Age", Value::Int(77))])
        .await?;
    let names: Vec<_> = list.iter().filter_map(|r| r.get_str("Name")).collect();
    ensure!(
        names == ["List C", "List A", "List B"],
        "expected key order, got {:?}",
        names
    );

    let unscheduled = crud
        .get_list(
            conn.as_mut(),
            &USERS,
            &[("Age", Value::Int(77)), ("ScheduledDayOff", Value::Null)],
        )
        .await?;
    ensure!(unscheduled.len() == 3);

    let everyone = crud.get_list(conn.as_mut(), &USERS, &[]).await?;
    ensure!(everyone.len() >= 3);

    conn.close().await?;
    Ok(())
}

async fn update_user(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    let id = Value::Int(integer_key(
        crud.insert(conn.as_mut(), &USERS, &user("Before", 20)).await?,
    )?);
    let changes = Record::new()
        .with("Name", "After")
        .with("Age", 21)
        .with("ScheduledDayOff", 3);
    let affected = crud.update(conn.as_mut(), &USERS, &id, &changes).await?;
    ensure!(affected == 1, "expected 1 updated row, got {}", affected);

    let record = crud
        .get(conn.as_mut(), &USERS, &id)
        .await?
        .context("updated user not found")?;
    ensure!(record.get_str("Name") == Some("After"));
    ensure!(record.get_i64("Age") == Some(21));
    ensure!(record.get_i64("ScheduledDayOff") == Some(3));

    let missing = crud
        .update(conn.as_mut(), &USERS, &Value::Int(-1), &changes)
        .await?;
    ensure!(missing == 0);

    conn.close().await?;
    Ok(())
}

async fn delete_user(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    let id = Value::Int(integer_key(
        crud.insert(conn.as_mut(), &USERS, &user("Delete Me", 30)).await?,
    )?);
    let before = crud.record_count(conn.as_mut(), &USERS).await?;

    ensure!(crud.delete(conn.as_mut(), &USERS, &id).await? == 1);
    ensure!(crud.get(conn.as_mut(), &USERS, &id).await?.is_none());
    ensure!(crud.record_count(conn.as_mut(), &USERS).await? == before - 1);
    ensure!(crud.delete(conn.as_mut(), &USERS, &id).await? == 0);

    conn.close().await?;
    Ok(())
}

async fn get_users_paged(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    for n in 1..=5 {
        crud.insert(conn.as_mut(), &USERS, &user(&format!("Page {}", n), 60 + n))
            .await?;
    }
    let total = crud.record_count(conn.as_mut(), &USERS).await?;

    let first = crud
        .get_list_paged(conn.as_mut(), &USERS, 1, 2, None)
        .await?;
    let second = crud
        .get_list_paged(conn.as_mut(), &USERS, 2, 2, None)
        .await?;
    ensure!(first.len() == 2 && second.len() == 2);

    let first_ids: Vec<_> = first.iter().filter_map(|r| r.get_i64("Id")).collect();
    let second_ids: Vec<_> = second.iter().filter_map(|r| r.get_i64("Id")).collect();
    ensure!(
        first_ids[0] < first_ids[1] && first_ids[1] < second_ids[0],
        "pages out of order: {:?} then {:?}",
        first_ids,
        second_ids
    );

    let beyond = u32::try_from(total)? + 1;
    let empty = crud
        .get_list_paged(conn.as_mut(), &USERS, beyond, 1, Some("Name"))
        .await?;
    ensure!(empty.is_empty());

    conn.close().await?;
    Ok(())
}

async fn insert_car_with_non_key_id(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    let car = Record::new()
        .with("Id", 4242)
        .with("Make", "Honda")
        .with("Model", "Civic");
    let key = integer_key(crud.insert(conn.as_mut(), &CARS, &car).await?)?;

    let record = crud
        .get(conn.as_mut(), &CARS, &Value::Int(key))
        .await?
        .context("inserted car not found")?;
    ensure!(record.get_i64("CarId") == Some(key));
    ensure!(
        record.get_i64("Id") == Some(4242),
        "the non-key Id column must keep the supplied value"
    );
    ensure!(record.get_str("Model") == Some("Civic"));

    conn.close().await?;
    Ok(())
}

async fn insert_big_car_key_above_i32(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    let car = Record::new().with("Make", "Big").with("Model", "Car");
    let key = integer_key(crud.insert(conn.as_mut(), &BIG_CARS, &car).await?)?;
    ensure!(
        key > i64::from(i32::MAX),
        "BigCar key {} does not exceed the 32-bit range",
        key
    );

    let record = crud
        .get(conn.as_mut(), &BIG_CARS, &Value::Int(key))
        .await?
        .context("inserted big car not found")?;
    ensure!(record.get_i64("CarId") == Some(key));

    conn.close().await?;
    Ok(())
}

async fn insert_city_without_key(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    let city = Record::new()
        .with("Name", "Springfield")
        .with("Population", 30720);
    let key = crud.insert(conn.as_mut(), &CITIES, &city).await?;
    ensure!(key.is_none(), "key-less insert returned {:?}", key);

    let found = crud
        .get_list(
            conn.as_mut(),
            &CITIES,
            &[("Name", Value::from("Springfield"))],
        )
        .await?;
    ensure!(found.len() == 1);
    ensure!(found[0].get_i64("Population") == Some(30720));

    conn.close().await?;
    Ok(())
}

async fn insert_and_get_with_schema(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    let log = Record::new().with("LogNotes", "oil change");
    let key = integer_key(crud.insert(conn.as_mut(), &CAR_LOGS, &log).await?)?;

    let record = crud
        .get(conn.as_mut(), &CAR_LOGS, &Value::Int(key))
        .await?
        .context("inserted log entry not found")?;
    ensure!(record.get_str("LogNotes") == Some("oil change"));

    conn.close().await?;
    Ok(())
}

async fn insert_and_update_strange_column_names(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    let item = Record::new()
        .with("word", "select")
        .with("Order", 1)
        .with("Group", "from");
    let key = Value::Int(integer_key(
        crud.insert(conn.as_mut(), &STRANGE_COLUMN_NAMES, &item).await?,
    )?);

    let changes = Record::new().with("Order", 2).with("Group", Value::Null);
    let affected = crud
        .update(conn.as_mut(), &STRANGE_COLUMN_NAMES, &key, &changes)
        .await?;
    ensure!(affected == 1);

    let record = crud
        .get(conn.as_mut(), &STRANGE_COLUMN_NAMES, &key)
        .await?
        .context("inserted item not found")?;
    ensure!(record.get_str("word") == Some("select"));
    ensure!(record.get_i64("Order") == Some(2));
    ensure!(record.get("Group").is_some_and(Value::is_null));

    conn.close().await?;
    Ok(())
}

async fn insert_and_get_guid_key(suite: &CrudSuite) -> anyhow::Result<()> {
    let crud = suite.crud();
    let mut conn = suite.connect().await?;

    let id = uuid::Uuid::new_v4();
    let row = Record::new().with("Id", id).with("name", "guid row");
    let key = crud
        .insert(conn.as_mut(), &GUID_TESTS, &row)
        .await?
        .context("insert returned no key")?;
    ensure!(key.as_uuid() == Some(id));

    let record = crud
        .get(conn.as_mut(), &GUID_TESTS, &Value::Uuid(id))
        .await?
        .context("inserted GUID row not found")?;
    ensure!(record.get("Id").and_then(Value::as_uuid) == Some(id));
    ensure!(record.get_str("name") == Some("guid row"));

    conn.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, SQLITE};
    use crate::suite::SkipPolicy;

    #[test]
    fn test_registry_order_and_names() {
        let registry = CrudSuite::registry().unwrap();
        let names = registry.names();
        assert_eq!(names.first(), Some(&"insert_user"));
        assert_eq!(names.last(), Some(&"insert_and_get_guid_key"));
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn test_skip_rules_select_the_expected_cases() {
        let registry = CrudSuite::registry().unwrap();
        let policy = SkipPolicy::default();

        let skipped_on_sqlite: Vec<_> = registry
            .names()
            .into_iter()
            .filter(|name| policy.should_skip(Dialect::Sqlite, name))
            .collect();
        assert_eq!(
            skipped_on_sqlite,
            vec!["insert_and_get_with_schema", "insert_and_get_guid_key"]
        );

        let skipped_on_postgres: Vec<_> = registry
            .names()
            .into_iter()
            .filter(|name| policy.should_skip(Dialect::PostgreSql, name))
            .collect();
        assert_eq!(skipped_on_postgres, vec!["insert_and_get_guid_key"]);
    }

    #[test]
    fn test_entities_match_standard_schema() {
        let schema = crate::schema::SchemaDefinition::standard();
        for entity in [
            USERS,
            CARS,
            BIG_CARS,
            CITIES,
            CAR_LOGS,
            STRANGE_COLUMN_NAMES,
            GUID_TESTS,
        ] {
            let table = schema
                .tables
                .iter()
                .find(|t| t.name == entity.table && t.schema == entity.schema)
                .unwrap_or_else(|| panic!("{} is not in the schema", entity.table));
            for column in entity.selectable() {
                assert!(
                    table.columns.iter().any(|c| c.name == column),
                    "{}.{} is not defined",
                    entity.table,
                    column
                );
            }
        }
    }

    #[test]
    fn test_suite_uses_profile_dialect() {
        let suite = CrudSuite::new(&SQLITE, "sqlite::memory:");
        assert_eq!(suite.crud().profile().dialect, Dialect::Sqlite);
    }
}
