use std::collections::BTreeSet;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use livepref::{ObjectHolder, PrefStore};

use super::app::ValueKind;

const HAS_LOGGED_IN_BEFORE: &str = "HAS_LOGGED_IN_BEFORE";
const DATE_DATA_KEY: &str = "DATE_DATA_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DateData {
    year: i32,
    month: u8,
    day_of_month: u8,
}

fn parse_set(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Print the value stored under `key`
pub async fn get_command(store: &PrefStore, key: String, kind: ValueKind) -> Result<()> {
    info!("Getting preference: {} as {:?}", key, kind);

    if !store.has_key(&key).await? {
        anyhow::bail!("Key '{}' is not set", key);
    }

    match kind {
        ValueKind::Int => println!("{}", store.get_int(&key, 0).await?),
        ValueKind::Long => println!("{}", store.get_long(&key, 0).await?),
        ValueKind::Float => println!("{}", store.get_float(&key, 0.0).await?),
        ValueKind::Double => println!("{}", store.get_double(&key, 0.0).await?),
        ValueKind::Bool => println!("{}", store.get_bool(&key, false).await?),
        ValueKind::String => println!("{}", store.get_string(&key, "").await?),
        ValueKind::StringSet => {
            let set = store.get_string_set(&key, BTreeSet::new()).await?;
            println!("{}", set.into_iter().collect::<Vec<_>>().join(","));
        }
        ValueKind::Json => match store.get_object::<serde_json::Value>(&key).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("null"),
        },
    }

    Ok(())
}

/// Parse `value` as `kind` and store it under `key`
pub async fn set_command(
    store: &PrefStore,
    key: String,
    value: String,
    kind: ValueKind,
) -> Result<()> {
    info!("Setting preference: {} as {:?}", key, kind);

    match kind {
        ValueKind::Int => {
            let v = value.parse().context("Failed to parse as int")?;
            store.put_int(&key, v).await?;
        }
        ValueKind::Long => {
            let v = value.parse().context("Failed to parse as long")?;
            store.put_long(&key, v).await?;
        }
        ValueKind::Float => {
            let v = value.parse().context("Failed to parse as float")?;
            store.put_float(&key, v).await?;
        }
        ValueKind::Double => {
            let v = value.parse().context("Failed to parse as double")?;
            store.put_double(&key, v).await?;
        }
        ValueKind::Bool => {
            let v = value.parse().context("Failed to parse as bool")?;
            store.put_bool(&key, v).await?;
        }
        ValueKind::String => store.put_string(&key, value).await?,
        ValueKind::StringSet => store.put_string_set(&key, parse_set(&value)).await?,
        ValueKind::Json => {
            let v: serde_json::Value =
                serde_json::from_str(&value).context("Failed to parse as JSON")?;
            store.put_object(&key, Some(v)).await?;
        }
    }

    println!("✓ {} updated", key);
    Ok(())
}

pub async fn delete_command(store: &PrefStore, key: String) -> Result<()> {
    if store.delete_key(&key).await? {
        println!("✓ {} deleted", key);
    } else {
        println!("{} was not set", key);
    }
    Ok(())
}

pub async fn has_command(store: &PrefStore, key: String) -> Result<()> {
    println!("{}", store.has_key(&key).await?);
    Ok(())
}

pub async fn keys_command(store: &PrefStore) -> Result<()> {
    for key in store.keys().await? {
        println!("{}", key);
    }
    Ok(())
}

/// Flip the sample flag, storing a date while it is on and clearing it when off
pub async fn demo_command(store: &PrefStore) -> Result<()> {
    let logged_in = store.observe_bool(HAS_LOGGED_IN_BEFORE).await?;
    logged_in.listen(|checked| println!("{} Observe", checked));

    let date = store.observe_object::<DateData>(DATE_DATA_KEY).await?;
    date.listen(|holder: &ObjectHolder<DateData>| {
        if let Some(data) = holder.value() {
            println!("{:?} Observed", data);
        }
    });

    let checked = !logged_in.value();
    store.put_bool(HAS_LOGGED_IN_BEFORE, checked).await?;

    if checked {
        let data = DateData {
            year: 2021,
            month: 5,
            day_of_month: 31,
        };
        store.put_object(DATE_DATA_KEY, Some(data)).await?;
    } else {
        store.put_object::<DateData>(DATE_DATA_KEY, None).await?;
    }

    Ok(())
}
