//! # Typed Commands
//!
//! Purpose: Give each server command a typed method without repeating the
//! encode/decode plumbing.
//!
//! Every method is a row of (command name, arguments, decoder): it builds
//! the argument list, calls `execute`, and applies one `Response` decoder.
//! Any type that can execute a raw command gets the whole surface by
//! implementing the one required method.

use std::collections::HashMap;

use crate::connection::Connection;
use crate::error::ClientResult;
use crate::protocol::Arg;
use crate::response::Response;

macro_rules! commands {
    ($(
        $(#[$meta:meta])*
        fn $method:ident($($arg:ident: $ty:ty),*) -> $ret:ty = $cmd:literal => $decode:ident;
    )*) => {
        $(
            $(#[$meta])*
            fn $method(&mut self, $($arg: $ty),*) -> ClientResult<$ret> {
                self.execute($cmd, &[$(Arg::from($arg)),*])?.$decode()
            }
        )*
    };
}

/// Typed command surface over a raw `execute`.
pub trait Commands {
    /// Sends one command and returns its undecoded response.
    fn execute(&mut self, cmd: &str, args: &[Arg<'_>]) -> ClientResult<Response>;

    commands! {
        // Key/value
        fn set(key: &str, value: &str) -> () = "set" => ok;
        /// Sets a value that expires after `ttl_secs` seconds.
        fn setx(key: &str, value: &str, ttl_secs: i64) -> () = "setx" => ok;
        fn get(key: &str) -> String = "get" => string_value;
        fn del(key: &str) -> () = "del" => ok;
        fn exists(key: &str) -> bool = "exists" => bool_value;
        /// Adds `by` to the integer stored at `key` and returns the new value.
        fn incr(key: &str, by: i64) -> i64 = "incr" => i64_value;
        /// Keys in `(key_start, key_end]`.
        fn keys(key_start: &str, key_end: &str, limit: usize) -> Vec<String> = "keys" => string_list;
        /// Key/value pairs in `(key_start, key_end]`.
        fn scan(key_start: &str, key_end: &str, limit: usize) -> HashMap<String, String> = "scan" => string_map;
        /// Key/value pairs in `[key_end, key_start)`, walking backwards.
        fn rscan(key_start: &str, key_end: &str, limit: usize) -> HashMap<String, String> = "rscan" => string_map;
        /// `kvs` alternates keys and values.
        fn multi_set(kvs: &[&str]) -> () = "multi_set" => ok;
        fn multi_get(keys: &[&str]) -> HashMap<String, String> = "multi_get" => string_map;
        fn multi_del(keys: &[&str]) -> () = "multi_del" => ok;

        // Sorted sets
        fn zset(name: &str, key: &str, score: i64) -> () = "zset" => ok;
        fn zget(name: &str, key: &str) -> i64 = "zget" => i64_value;
        fn zincr(name: &str, key: &str, by: i64) -> i64 = "zincr" => i64_value;
        fn zdel(name: &str, key: &str) -> () = "zdel" => ok;
        fn zsize(name: &str) -> i64 = "zsize" => i64_value;
        /// Members after `key_start` with `score_start <= score <= score_end`.
        fn zscan(name: &str, key_start: &str, score_start: i64, score_end: i64, limit: usize) -> HashMap<String, i64> = "zscan" => int_map;
        /// Set names in `(name_start, name_end]`.
        fn zlist(name_start: &str, name_end: &str, limit: usize) -> Vec<String> = "zlist" => string_list;
        fn zclear(name: &str) -> () = "zclear" => ok;
        fn zcount(name: &str, score_start: i64, score_end: i64) -> i64 = "zcount" => i64_value;
        fn zexists(name: &str, key: &str) -> bool = "zexists" => bool_value;
        fn zkeys(name: &str, key_start: &str, score_start: i64, score_end: i64, limit: usize) -> Vec<String> = "zkeys" => string_list;
        fn multi_zget(name: &str, keys: &[&str]) -> HashMap<String, i64> = "multi_zget" => int_map;

        // Hashes
        fn hset(name: &str, key: &str, value: &str) -> () = "hset" => ok;
        fn hget(name: &str, key: &str) -> String = "hget" => string_value;
        fn hdel(name: &str, key: &str) -> () = "hdel" => ok;
        fn hincr(name: &str, key: &str, by: i64) -> i64 = "hincr" => i64_value;
        fn hexists(name: &str, key: &str) -> bool = "hexists" => bool_value;
        fn hsize(name: &str) -> i64 = "hsize" => i64_value;
        fn hlist(name_start: &str, name_end: &str, limit: usize) -> Vec<String> = "hlist" => string_list;
        fn hrlist(name_start: &str, name_end: &str, limit: usize) -> Vec<String> = "hrlist" => string_list;
        fn hkeys(name: &str, key_start: &str, key_end: &str, limit: usize) -> Vec<String> = "hkeys" => string_list;
        fn hgetall(name: &str) -> HashMap<String, String> = "hgetall" => string_map;
        fn hscan(name: &str, key_start: &str, key_end: &str, limit: usize) -> HashMap<String, String> = "hscan" => string_map;
        fn hrscan(name: &str, key_start: &str, key_end: &str, limit: usize) -> HashMap<String, String> = "hrscan" => string_map;
        fn hclear(name: &str) -> () = "hclear" => ok;
        /// `kvs` alternates field names and values.
        fn multi_hset(name: &str, kvs: &[&str]) -> () = "multi_hset" => ok;
        fn multi_hget(name: &str, keys: &[&str]) -> HashMap<String, String> = "multi_hget" => string_map;
        fn multi_hdel(name: &str, keys: &[&str]) -> () = "multi_hdel" => ok;

        // Queues
        /// Returns the queue length after the push.
        fn qpush_front(name: &str, value: &str) -> i64 = "qpush_front" => i64_value;
        fn qpush_back(name: &str, value: &str) -> i64 = "qpush_back" => i64_value;
        fn qpop_front(name: &str) -> String = "qpop_front" => string_value;
        fn qpop_back(name: &str) -> String = "qpop_back" => string_value;
        fn qsize(name: &str) -> i64 = "qsize" => i64_value;
        fn qlist(name_start: &str, name_end: &str, limit: usize) -> Vec<String> = "qlist" => string_list;
        fn qrlist(name_start: &str, name_end: &str, limit: usize) -> Vec<String> = "qrlist" => string_list;
        fn qclear(name: &str) -> () = "qclear" => ok;
        fn qfront(name: &str) -> String = "qfront" => string_value;
        fn qback(name: &str) -> String = "qback" => string_value;
        fn qget(name: &str, index: i64) -> String = "qget" => string_value;
        /// Items with `begin <= index <= end`.
        fn qslice(name: &str, begin: i64, end: i64) -> Vec<String> = "qslice" => string_list;
    }

    /// Sets several sorted-set members at once.
    fn multi_zset(&mut self, name: &str, members: &[(&str, i64)]) -> ClientResult<()> {
        let mut args = Vec::with_capacity(1 + members.len() * 2);
        args.push(Arg::from(name));
        for (key, score) in members {
            args.push(Arg::from(*key));
            args.push(Arg::from(*score));
        }
        self.execute("multi_zset", &args)?.ok()
    }
}

impl Commands for Connection {
    fn execute(&mut self, cmd: &str, args: &[Arg<'_>]) -> ClientResult<Response> {
        Connection::execute(self, cmd, args)
    }
}
