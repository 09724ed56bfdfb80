//! Keyspace Commands
//!
//! The application-level commands the server binary registers on top of the
//! built-in `PING`:
//!
//! - `SET key value [EX seconds | PX milliseconds]`
//! - `GET key`
//! - `DEL key [key ...]`
//! - `EXISTS key [key ...]`
//! - `EXPIRE key seconds`
//! - `TTL key`
//! - `DBSIZE`

use crate::commands::command::CommandError;
use crate::commands::handler::CommandTable;
use crate::protocol::RespValue;
use crate::storage::Store;
use bytes::Bytes;
use std::time::Duration;

/// Adds every keyspace command to `table`.
pub fn register(table: &mut CommandTable) {
    table.register("SET", cmd_set);
    table.register("GET", cmd_get);
    table.register("DEL", cmd_del);
    table.register("EXISTS", cmd_exists);
    table.register("EXPIRE", cmd_expire);
    table.register("TTL", cmd_ttl);
    table.register("DBSIZE", cmd_dbsize);
}

fn parse_positive(arg: &[u8], command: &'static str) -> Result<u64, CommandError> {
    let n: i64 = std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)?;
    u64::try_from(n)
        .ok()
        .filter(|n| *n > 0)
        .ok_or(CommandError::InvalidExpireTime(command))
}

/// SET key value [EX seconds | PX milliseconds]
fn cmd_set(args: &[Bytes], store: &mut Store) -> Result<RespValue, CommandError> {
    let (key, value, options) = match args {
        [key, value, options @ ..] => (key, value, options),
        _ => return Err(CommandError::WrongArity("set")),
    };

    let ttl = match options {
        [] => None,
        [unit, amount] => {
            let amount = parse_positive(amount, "set")?;
            match unit.to_ascii_uppercase().as_slice() {
                b"EX" => Some(Duration::from_secs(amount)),
                b"PX" => Some(Duration::from_millis(amount)),
                _ => return Err(CommandError::Syntax),
            }
        }
        _ => return Err(CommandError::Syntax),
    };

    match ttl {
        Some(ttl) => store.set_with_ttl(key.clone(), value.clone(), ttl),
        None => store.set(key.clone(), value.clone()),
    };
    Ok(RespValue::ok())
}

/// GET key
fn cmd_get(args: &[Bytes], store: &mut Store) -> Result<RespValue, CommandError> {
    let [key] = args else {
        return Err(CommandError::WrongArity("get"));
    };
    Ok(store.get(key).map_or(RespValue::Null, RespValue::BulkString))
}

/// DEL key [key ...]
fn cmd_del(args: &[Bytes], store: &mut Store) -> Result<RespValue, CommandError> {
    if args.is_empty() {
        return Err(CommandError::WrongArity("del"));
    }
    let deleted = args.iter().filter(|key| store.delete(key)).count();
    Ok(RespValue::integer(deleted as i64))
}

/// EXISTS key [key ...]
fn cmd_exists(args: &[Bytes], store: &mut Store) -> Result<RespValue, CommandError> {
    if args.is_empty() {
        return Err(CommandError::WrongArity("exists"));
    }
    let found = args.iter().filter(|key| store.exists(key)).count();
    Ok(RespValue::integer(found as i64))
}

/// EXPIRE key seconds
fn cmd_expire(args: &[Bytes], store: &mut Store) -> Result<RespValue, CommandError> {
    let [key, seconds] = args else {
        return Err(CommandError::WrongArity("expire"));
    };
    let seconds = parse_positive(seconds, "expire")?;
    let applied = store.expire(key, Duration::from_secs(seconds));
    Ok(RespValue::integer(i64::from(applied)))
}

/// TTL key
///
/// `-2` if the key does not exist, `-1` if it has no expiry, otherwise the
/// remaining seconds rounded to the nearest second.
fn cmd_ttl(args: &[Bytes], store: &mut Store) -> Result<RespValue, CommandError> {
    let [key] = args else {
        return Err(CommandError::WrongArity("ttl"));
    };
    let ttl = match store.ttl_ms(key) {
        None => -2,
        Some(-1) => -1,
        Some(ms) => (ms + 500) / 1000,
    };
    Ok(RespValue::integer(ttl))
}

/// DBSIZE
fn cmd_dbsize(args: &[Bytes], store: &mut Store) -> Result<RespValue, CommandError> {
    if !args.is_empty() {
        return Err(CommandError::WrongArity("dbsize"));
    }
    Ok(RespValue::integer(store.len() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::storage::{Expiry, now_ms};

    fn exec(store: &mut Store, parts: &[&str]) -> Result<RespValue, CommandError> {
        let table = CommandTable::with_keyspace();
        let cmd = Command::new(
            parts[0],
            parts[1..].iter().map(|a| Bytes::from(a.to_string())).collect(),
        );
        table.evaluate(&cmd, store)
    }

    #[test]
    fn test_set_get() {
        let mut store = Store::new();

        assert_eq!(exec(&mut store, &["SET", "name", "dice"]), Ok(RespValue::ok()));
        assert_eq!(
            exec(&mut store, &["get", "name"]),
            Ok(RespValue::bulk_string(Bytes::from("dice")))
        );
        assert_eq!(exec(&mut store, &["GET", "missing"]), Ok(RespValue::Null));
    }

    #[test]
    fn test_set_with_expiry_options() {
        let mut store = Store::new();

        exec(&mut store, &["SET", "a", "1", "EX", "100"]).unwrap();
        exec(&mut store, &["SET", "b", "1", "px", "100000"]).unwrap();
        assert_eq!(store.volatile_len(), 2);
        assert_eq!(exec(&mut store, &["TTL", "a"]), Ok(RespValue::integer(100)));
        assert_eq!(exec(&mut store, &["TTL", "b"]), Ok(RespValue::integer(100)));
    }

    #[test]
    fn test_set_rejects_bad_options() {
        let mut store = Store::new();

        assert_eq!(exec(&mut store, &["SET", "k"]), Err(CommandError::WrongArity("set")));
        assert_eq!(exec(&mut store, &["SET", "k", "v", "EX"]), Err(CommandError::Syntax));
        assert_eq!(exec(&mut store, &["SET", "k", "v", "XX", "10"]), Err(CommandError::Syntax));
        assert_eq!(
            exec(&mut store, &["SET", "k", "v", "EX", "0"]),
            Err(CommandError::InvalidExpireTime("set"))
        );
        assert_eq!(
            exec(&mut store, &["SET", "k", "v", "EX", "soon"]),
            Err(CommandError::NotAnInteger)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_del_and_exists() {
        let mut store = Store::new();
        exec(&mut store, &["SET", "a", "1"]).unwrap();
        exec(&mut store, &["SET", "b", "2"]).unwrap();

        assert_eq!(exec(&mut store, &["EXISTS", "a", "b", "c"]), Ok(RespValue::integer(2)));
        assert_eq!(exec(&mut store, &["DEL", "a", "c"]), Ok(RespValue::integer(1)));
        assert_eq!(exec(&mut store, &["DBSIZE"]), Ok(RespValue::integer(1)));
    }

    #[test]
    fn test_expire_and_ttl() {
        let mut store = Store::new();
        exec(&mut store, &["SET", "k", "v"]).unwrap();

        assert_eq!(exec(&mut store, &["TTL", "k"]), Ok(RespValue::integer(-1)));
        assert_eq!(exec(&mut store, &["EXPIRE", "k", "30"]), Ok(RespValue::integer(1)));
        assert_eq!(exec(&mut store, &["TTL", "k"]), Ok(RespValue::integer(30)));
        assert_eq!(exec(&mut store, &["EXPIRE", "nope", "30"]), Ok(RespValue::integer(0)));
        assert_eq!(exec(&mut store, &["TTL", "nope"]), Ok(RespValue::integer(-2)));
    }

    #[test]
    fn test_get_on_expired_key() {
        let mut store = Store::new();
        store.set_with_expiry(Bytes::from("k"), Bytes::from("v"), Expiry::At(now_ms() - 1));

        assert_eq!(exec(&mut store, &["GET", "k"]), Ok(RespValue::Null));
        assert!(store.is_empty());
    }
}
