use simplelog::{Config, LevelFilter, SimpleLogger};
use std::env;
use std::io::ErrorKind;
use std::path::PathBuf;
use twinlog::{Result, Store, Value};

fn main() {
    if let Err(error) = run() {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let _ = SimpleLogger::init(LevelFilter::Info, Config::default());

    let mut args = env::args().skip(1);
    let data_dir = env::var("TWINLOG_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));
    let store = Store::open(&data_dir)?;

    match args.next().as_deref() {
        Some("set") => {
            let key = args.next().ok_or_else(|| invalid("missing key"))?;
            let value = args.next().ok_or_else(|| invalid("missing value"))?;
            store.set(key.as_str(), value.as_str())?;
            println!("stored");
        }
        Some("get") => {
            let key = args.next().ok_or_else(|| invalid("missing key"))?;
            match store.get(key.as_str())? {
                Some(Value::Json(value)) => println!("{value}"),
                Some(Value::Bytes(bytes)) => println!("{} raw bytes", bytes.len()),
                Some(Value::Opaque(bytes)) => println!("{} opaque bytes", bytes.len()),
                None => println!("key not found"),
            }
        }
        Some("del") => {
            let key = args.next().ok_or_else(|| invalid("missing key"))?;
            store.del(key.as_str())?;
            println!("deleted");
        }
        Some("contains") => {
            let key = args.next().ok_or_else(|| invalid("missing key"))?;
            println!("{}", store.contains(key.as_str())?);
        }
        Some("reclaim") => {
            store.reclaim()?;
            println!("reclaimed");
        }
        Some("help") | None => print_usage(),
        Some(command) => {
            return Err(invalid(&format!("unknown command '{command}'")));
        }
    }

    store.close()
}

fn invalid(message: &str) -> twinlog::Error {
    twinlog::Error::Io(std::io::Error::new(
        ErrorKind::InvalidInput,
        message.to_string(),
    ))
}

fn print_usage() {
    println!("Usage: twinlog <command> [args]");
    println!("  set <key> <value>   store a value");
    println!("  get <key>           print the stored value");
    println!("  del <key>           remove a key");
    println!("  contains <key>      report whether a key is present");
    println!("  reclaim             rewrite the logs keeping only live entries");
    println!();
    println!("The store directory defaults to ./data; set TWINLOG_DATA_DIR to override.");
}
