//! # CLI — FathomDB interactive shell
//!
//! A REPL over one opened database file. Reads commands from stdin,
//! runs them against the reader, prints results to stdout. Works
//! interactively and scripted (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! GET key                  Point lookup by integer key
//! ALL [limit]              Full scan in ascending key order
//! RANGE start end [limit]  Inclusive range scan
//! WHERE path op value      Predicate scan (path is dot-separated;
//!                          op is = != < > LIKE ILIKE)
//! HAS value                Match whole record values
//! META                     Print database metadata
//! VALIDATE                 Check file consistency
//! PARTS id                 Which partition holds id
//! ENCRYPT in out password  Seal a file into an encrypted container
//! DECRYPT in out password  Unseal an encrypted container
//! EXIT / QUIT              Leave the shell
//! ```
//!
//! ## Configuration
//!
//! ```text
//! FATHOM_DB   Database file to open (default: "data/fathom.db")
//! ```

use std::io::{self, BufRead, Write};

use anyhow::Result;
use reader::{Op, Operand, PathPart, Reader};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Dot-separated path into path parts; numeric segments become slice
/// indices.
fn parse_path(raw: &str) -> Vec<PathPart> {
    raw.split('.')
        .map(|segment| match segment.parse::<i64>() {
            Ok(index) => PathPart::Index(index),
            Err(_) => PathPart::from(segment),
        })
        .collect()
}

/// Guesses the operand type: bool, then integer, then float, then
/// string.
fn parse_operand(raw: &str) -> Operand {
    match raw {
        "true" => return Operand::Bool(true),
        "false" => return Operand::Bool(false),
        _ => {}
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Operand::Int(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return Operand::F64(v);
    }
    Operand::from(raw)
}

fn print_record(record: &reader::Record<'_>) {
    match record.decode() {
        Ok(value) => println!("{} -> {:?}", record.key(), value),
        Err(err) => println!("{} -> ERR decode failed: {}", record.key(), err),
    }
}

/// Drains a scan to stdout, stopping at `limit` entries.
fn print_scan<'a, I>(scan: I, limit: usize)
where
    I: Iterator<Item = Result<reader::Record<'a>, reader::Error>>,
{
    let mut count = 0usize;
    for item in scan.take(limit) {
        match item {
            Ok(record) => {
                print_record(&record);
                count += 1;
            }
            Err(err) => {
                println!("ERR scan failed: {}", err);
                break;
            }
        }
    }
    println!("({} entries)", count);
}

fn main() -> Result<()> {
    let db_path = env_or("FATHOM_DB", "data/fathom.db");
    let mut db = Reader::open(&db_path)?;

    let meta = db.metadata();
    println!(
        "FathomDB shell (db={}, name={:?}, keys={}, nodes={})",
        db_path, meta.name, meta.data_count, meta.node_count
    );
    println!("Commands: GET key | ALL [limit] | RANGE start end [limit]");
    println!("          WHERE path op value | HAS value | META | VALIDATE");
    println!("          PARTS id | ENCRYPT in out pw | DECRYPT in out pw | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "GET" => match parts.next().map(str::parse::<u64>) {
                    Some(Ok(key)) => match db.find(key) {
                        Ok(Some(record)) => print_record(&record),
                        Ok(None) => println!("(nil)"),
                        Err(err) => println!("ERR find failed: {}", err),
                    },
                    _ => println!("ERR usage: GET key"),
                },
                "ALL" => {
                    let limit: usize = parts
                        .next()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(usize::MAX);
                    match db.get_all() {
                        Ok(scan) => print_scan(scan, limit),
                        Err(err) => println!("ERR scan failed: {}", err),
                    }
                }
                "RANGE" => {
                    let bounds = (
                        parts.next().and_then(|v| v.parse::<u64>().ok()),
                        parts.next().and_then(|v| v.parse::<u64>().ok()),
                    );
                    let limit: usize = parts
                        .next()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(usize::MAX);
                    match bounds {
                        (Some(start), Some(end)) => match db.get_range(start, end) {
                            Ok(scan) => print_scan(scan, limit),
                            Err(err) => println!("ERR scan failed: {}", err),
                        },
                        _ => println!("ERR usage: RANGE start end [limit]"),
                    }
                }
                "WHERE" => {
                    let args = (parts.next(), parts.next(), parts.next());
                    if let (Some(path), Some(op), Some(value)) = args {
                        match op.parse::<Op>() {
                            Ok(op) => {
                                let path = parse_path(path);
                                let operand = parse_operand(value);
                                let mut count = 0usize;
                                let outcome = db.where_(&path, op, &operand, |record| {
                                    print_record(&record);
                                    count += 1;
                                    true
                                });
                                match outcome {
                                    Ok(()) => println!("({} matches)", count),
                                    Err(err) => println!("ERR where failed: {}", err),
                                }
                            }
                            Err(err) => println!("ERR {}", err),
                        }
                    } else {
                        println!("ERR usage: WHERE path op value");
                    }
                }
                "HAS" => {
                    if let Some(value) = parts.next() {
                        let operand = parse_operand(value);
                        let mut count = 0usize;
                        let outcome = db.where_has(&operand, |record| {
                            print_record(&record);
                            count += 1;
                            true
                        });
                        match outcome {
                            Ok(()) => println!("({} matches)", count),
                            Err(err) => println!("ERR has failed: {}", err),
                        }
                    } else {
                        println!("ERR usage: HAS value");
                    }
                }
                "META" => {
                    let meta = db.metadata();
                    println!(
                        "name={:?} created_at={} node_count={} data_count={}",
                        meta.name, meta.created_at, meta.node_count, meta.data_count
                    );
                    match &meta.partitions {
                        Some(parts) => println!(
                            "partitions: current={} total={} ranges={}",
                            parts.current,
                            parts.total,
                            parts.ranges.len()
                        ),
                        None => println!("partitions: none"),
                    }
                }
                "VALIDATE" => match db.validate() {
                    Ok(()) => println!("OK"),
                    Err(err) => println!("ERR invalid database: {}", err),
                },
                "PARTS" => match parts.next().map(str::parse::<u64>) {
                    Some(Ok(id)) => match db.check_partition(id) {
                        Ok((_, true, label)) => println!("partition {} (this file)", label),
                        Ok((_, false, label)) => println!("partition {} (sibling file)", label),
                        Err(err) => println!("ERR {}", err),
                    },
                    _ => println!("ERR usage: PARTS id"),
                },
                "ENCRYPT" => {
                    let args = (parts.next(), parts.next(), parts.next());
                    if let (Some(input), Some(output), Some(password)) = args {
                        match envelope::encrypt(input, output, password) {
                            Ok(()) => println!("OK"),
                            Err(err) => println!("ERR encrypt failed: {}", err),
                        }
                    } else {
                        println!("ERR usage: ENCRYPT in out password");
                    }
                }
                "DECRYPT" => {
                    let args = (parts.next(), parts.next(), parts.next());
                    if let (Some(input), Some(output), Some(password)) = args {
                        match envelope::decrypt(input, output, password) {
                            Ok(()) => println!("OK"),
                            Err(err) => println!("ERR decrypt failed: {}", err),
                        }
                    } else {
                        println!("ERR usage: DECRYPT in out password");
                    }
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => println!("unknown command: {}", other),
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    db.close()?;
    Ok(())
}
