use std::env;
use std::fs;
use std::process::ExitCode;

use sqlrecover::db::Db;
use sqlrecover::heuristic;

fn usage(program: &str) -> String {
    format!(
        "usage:\n  {program} tables <db-file>\n  {program} dump <db-file> <table>\n  {program} recover <db-file> <table> [heuristics.yaml]\n  {program} grep <db-file> <needle>"
    )
}

fn run() -> Result<(), String> {
    env_logger::init();
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "sqlrecover".to_string());
    let command = args.next().ok_or_else(|| usage(&program))?;
    let db_path = args.next().ok_or_else(|| usage(&program))?;

    let db = Db::open(&db_path).map_err(|e| format!("failed to open {db_path}: {e}"))?;

    match command.as_str() {
        "tables" => {
            for table in db.tables() {
                println!(
                    "{}\troot={}\tcols={:?}\treparented={}",
                    table.name(),
                    table.root_page(),
                    table.columns(),
                    table.orphan_reparented()
                );
            }
            Ok(())
        }
        "dump" => {
            let table_name = args.next().ok_or_else(|| usage(&program))?;
            let table = db
                .table(&table_name)
                .ok_or_else(|| format!("no such table: {table_name}"))?;
            for row in table.live_rows(db.cache()) {
                let row = row.map_err(|e| e.to_string())?;
                println!("{:?}", row);
            }
            Ok(())
        }
        "recover" => {
            let table_name = args.next().ok_or_else(|| usage(&program))?;
            let yaml_path = args.next();
            let user_yaml = yaml_path
                .as_ref()
                .map(fs::read_to_string)
                .transpose()
                .map_err(|e| e.to_string())?;
            let registry = heuristic::load_registry(user_yaml.as_deref())
                .map_err(|e| format!("failed to load heuristics: {e}"))?;
            let heuristic = registry
                .find_any_grouping(&table_name)
                .ok_or_else(|| format!("no recovery heuristic known for table {table_name}"))?;
            let recovered = db
                .recover(&table_name, heuristic)
                .map_err(|e| e.to_string())?;
            for r in recovered {
                println!(
                    "page={} offset={} {:?}",
                    r.page,
                    r.freeblock_offset,
                    r.record.fields().iter().map(|f| &f.value).collect::<Vec<_>>()
                );
            }
            Ok(())
        }
        "grep" => {
            let needle = args.next().ok_or_else(|| usage(&program))?;
            let hits = db.grep(&needle).map_err(|e| e.to_string())?;
            for (page, offset) in hits {
                println!("page={page} offset={offset}");
            }
            Ok(())
        }
        _ => Err(usage(&program)),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
