/*!
Cellar CLI - Command-line interface for database snapshot archives.

Backs up an application's database tables and selected files into one gzip tar
archive, restores such archives, and inspects what they contain.
*/

use clap::{Parser, Subcommand, ValueEnum};
use cellar_core::{
    config::{
        verbose_from_env, ArchiverKind, CellarConfig, DatabaseConfig, ARCHIVER_ENV,
        DATABASE_URL_ENV, ROOT_ENV,
    },
    create_engine_from_config, observability, CellarError, Database, EngineInterface,
    SqliteDatabase, TableSelector,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tabled::{Table, Tabled};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "cellar")]
#[command(about = "Snapshot archives for application databases")]
#[command(version)]
struct Cli {
    /// Enable verbose logging (also enabled by the VERBOSE environment variable)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log events as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Application root; every archived path is relative to it
    #[arg(short, long, global = true, env = ROOT_ENV)]
    root: Option<PathBuf>,

    /// Database location, e.g. sqlite://db/production.sqlite3
    #[arg(short, long, global = true, env = DATABASE_URL_ENV)]
    database: Option<String>,

    /// Archiver implementation
    #[arg(short, long, global = true, value_enum, env = ARCHIVER_ENV, default_value = "native")]
    archiver: ArchiverType,

    /// Additional table to skip (repeatable)
    #[arg(short, long, global = true)]
    exclude: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Debug)]
enum ArchiverType {
    Native,
    Command,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the database and write an archive
    Backup {
        /// Archive file to write
        destination: PathBuf,
        /// Extra file or directory under the root to include (repeatable)
        #[arg(short, long = "include")]
        include: Vec<PathBuf>,
    },
    /// Load an archive back into the database
    Restore {
        /// Archive file to read
        source: PathBuf,
    },
    /// List database tables and whether they are backed up
    Tables,
    /// List the members of an archive
    Inspect {
        /// Archive file to read
        archive: PathBuf,
    },
}

#[derive(Tabled)]
struct TableInfo {
    #[tabled(rename = "Table")]
    name: String,
    #[tabled(rename = "Backed up")]
    included: String,
}

#[derive(Tabled)]
struct ExportInfo {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Rows")]
    rows: usize,
}

#[derive(Tabled)]
struct MemberInfo {
    #[tabled(rename = "Member")]
    path: String,
    #[tabled(rename = "Kind")]
    kind: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = cli.verbose || verbose_from_env();
    let logging = if cli.log_json {
        observability::init_json_tracing(verbose)
    } else {
        observability::init_tracing(verbose)
    };
    if let Err(e) = logging {
        eprintln!("warning: {e}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<CellarError>() {
                Some(cellar_error) => eprintln!("error[{}]: {}", cellar_error.kind(), cellar_error),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), anyhow::Error> {
    let config = create_config(&cli)?;
    debug!("Configuration: {:?}", config);

    match &cli.command {
        Commands::Backup {
            destination,
            include,
        } => backup(&cli, config, destination, include),
        Commands::Restore { source } => restore(&cli, config, source),
        Commands::Tables => list_tables(&cli, &config),
        Commands::Inspect { archive } => inspect(config, archive),
    }
}

fn create_config(cli: &Cli) -> Result<CellarConfig, anyhow::Error> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };

    let archiver = match cli.archiver {
        ArchiverType::Native => ArchiverKind::Native,
        ArchiverType::Command => ArchiverKind::Command,
    };

    let mut config = CellarConfig::new(root).with_archiver(archiver);
    config.excluded_tables.extend(cli.exclude.iter().cloned());
    config.verbose = cli.verbose;
    Ok(config)
}

fn open_database(cli: &Cli) -> Result<SqliteDatabase, anyhow::Error> {
    let uri = cli.database.as_deref().ok_or_else(|| {
        anyhow::anyhow!("No database given; pass --database or set {DATABASE_URL_ENV}")
    })?;
    info!("Opening database {}", uri);
    Ok(DatabaseConfig::from_uri(uri)?.open()?)
}

fn backup(
    cli: &Cli,
    config: CellarConfig,
    destination: &Path,
    include: &[PathBuf],
) -> Result<(), anyhow::Error> {
    let mut db = open_database(cli)?;
    let engine = create_engine_from_config(config)?;

    let report = engine.backup(&mut db, destination, include)?;

    let rows: Vec<ExportInfo> = report
        .export
        .tables
        .iter()
        .map(|t| ExportInfo {
            table: t.table.clone(),
            rows: t.rows,
        })
        .collect();
    if !rows.is_empty() {
        println!("{}", Table::new(rows));
    }

    let size = std::fs::metadata(&report.archive)
        .map(|meta| format_size(meta.len()))
        .unwrap_or_else(|_| "Unknown".to_string());
    println!(
        "✓ Wrote {} ({}, {} entries)",
        report.archive.display(),
        size,
        report.entries.len()
    );
    Ok(())
}

fn restore(cli: &Cli, config: CellarConfig, source: &Path) -> Result<(), anyhow::Error> {
    let mut db = open_database(cli)?;
    let engine = create_engine_from_config(config)?;

    let report = engine.restore(&mut db, source)?;
    println!(
        "✓ Restored {} rows into {} tables from {}",
        report.restore.total_rows(),
        report.restore.tables.len(),
        source.display()
    );
    Ok(())
}

fn list_tables(cli: &Cli, config: &CellarConfig) -> Result<(), anyhow::Error> {
    let mut db = open_database(cli)?;
    let selector = TableSelector::new(config.excluded_tables.iter().cloned());

    let mut names = db.table_names()?;
    names.sort();
    if names.is_empty() {
        println!("No tables found");
        return Ok(());
    }

    let tables: Vec<TableInfo> = names
        .into_iter()
        .map(|name| TableInfo {
            included: if selector.is_excluded(&name) { "no" } else { "yes" }.to_string(),
            name,
        })
        .collect();
    println!("{}", Table::new(tables));
    Ok(())
}

fn inspect(config: CellarConfig, archive: &Path) -> Result<(), anyhow::Error> {
    let record_dir = config.record_dir.clone();
    let engine: Box<dyn EngineInterface> = create_engine_from_config(config)?;
    let members = engine.members(archive)?;

    println!("Archive Details:");
    println!("  Path: {}", archive.display());
    if let Ok(meta) = std::fs::metadata(archive) {
        println!("  Size: {}", format_size(meta.len()));
        if let Ok(modified) = meta.modified() {
            println!("  Modified: {}", format_timestamp(modified));
        }
    }
    println!("  Members: {}", members.len());

    let rows: Vec<MemberInfo> = members
        .into_iter()
        .map(|path| MemberInfo {
            kind: member_kind(&path, &record_dir).to_string(),
            path: path.display().to_string(),
        })
        .collect();
    if !rows.is_empty() {
        println!("{}", Table::new(rows));
    }
    Ok(())
}

fn member_kind(path: &Path, record_dir: &Path) -> &'static str {
    let is_record = path.parent() == Some(record_dir)
        && path.extension().and_then(|e| e.to_str()) == Some("json");
    if is_record {
        "records"
    } else {
        "file"
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(time: std::time::SystemTime) -> String {
    let local: chrono::DateTime<chrono::Local> = time.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_member_kind() {
        let record_dir = Path::new("db/backup");
        assert_eq!(member_kind(Path::new("db/backup/users.json"), record_dir), "records");
        assert_eq!(member_kind(Path::new("db/backup"), record_dir), "file");
        assert_eq!(member_kind(Path::new("uploads/a.json"), record_dir), "file");
    }

    #[test]
    fn test_exclude_extends_defaults() {
        let cli = Cli::parse_from([
            "cellar",
            "--root",
            "/srv/app",
            "--exclude",
            "audit_log",
            "tables",
        ]);
        let config = create_config(&cli).unwrap();
        assert!(config.excluded_tables.contains(&"schema_migrations".to_string()));
        assert!(config.excluded_tables.contains(&"audit_log".to_string()));
    }

    #[test]
    fn test_log_json_flag() {
        let cli = Cli::parse_from(["cellar", "tables", "--log-json"]);
        assert!(cli.log_json);

        let cli = Cli::parse_from(["cellar", "tables"]);
        assert!(!cli.log_json);
    }

    #[test]
    fn test_env_names_match_core() {
        let command = <Cli as clap::CommandFactory>::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(|name| name.to_string_lossy().into_owned())
        };
        assert_eq!(env_of("root").as_deref(), Some(ROOT_ENV));
        assert_eq!(env_of("database").as_deref(), Some(DATABASE_URL_ENV));
        assert_eq!(env_of("archiver").as_deref(), Some(ARCHIVER_ENV));
    }

    #[test]
    fn test_backup_arguments() {
        let cli = Cli::parse_from([
            "cellar",
            "backup",
            "out.tgz",
            "--include",
            "uploads",
            "--include",
            "public/assets",
            "--archiver",
            "command",
        ]);
        match cli.command {
            Commands::Backup {
                destination,
                include,
            } => {
                assert_eq!(destination, PathBuf::from("out.tgz"));
                assert_eq!(include, vec![PathBuf::from("uploads"), PathBuf::from("public/assets")]);
            }
            _ => panic!("expected backup command"),
        }
        assert!(matches!(cli.archiver, ArchiverType::Command));
    }
}
