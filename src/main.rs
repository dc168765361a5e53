use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Args {
    /// List the classes the portal exposes instead of fetching a timetable
    #[clap(short, long)]
    list: bool,

    /// Class code as used by the portal's class selector
    #[clap(short, long, value_name = "CODE", required_unless_present = "list")]
    class: Option<i32>,

    /// Timetable portal URL
    #[clap(short, long, value_name = "URL")]
    url: String,

    /// Write the JSON to this file instead of stdout
    #[clap(short, long, value_name = "FILE")]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    let json = if args.list {
        info!("fetching the class list...");
        shahaf2json::classes_json(&args.url).await?
    } else {
        let class = args.class.context("a class code is required without --list")?;
        info!("fetching the timetable of class {class}...");
        shahaf2json::timetable_json(&args.url, class).await?
    };

    match args.output {
        Some(path) => {
            fs::write(&path, &json).with_context(|| format!("cannot write {path}"))?;
            info!("JSON written to {path}");
        }
        None => println!("{json}"),
    }

    Ok(())
}
