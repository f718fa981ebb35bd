use anyhow::Context as _;
use clap::Parser;
use dvdbnd::{
    exe::{self, ExeStatus},
    names::NameTable,
    unpack::{self, Unpacker},
};
use std::{
    env, fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

const BACKUP_DIR: &str = "unpackDS-backup";

#[derive(Parser)]
#[command(
    name = "unpack-dks",
    about = "Unpacks the Dark Souls archives into a loose file tree for modding",
    version,
    long_about = "Run from the game directory: the four archive pairs are unpacked next to \
                  the executable, and the executable is patched to read the loose files. \
                  Back-ups of everything modified are made first."
)]
struct Cli {
    /// Set the logging level (RUST_LOG overrides)
    #[arg(short, long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Answer yes to every prompt
    #[arg(short = 'y', long)]
    assume_yes: bool,

    /// Keep the binder temp directory on success
    #[arg(long)]
    keep_temp: bool,

    /// Merge an external hash dictionary (hex hash and path per line)
    #[arg(long, value_name = "FILE")]
    dictionary: Option<PathBuf>,

    /// Merge an extra path listing, hashed at load time
    #[arg(long, value_name = "FILE")]
    namelist: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::from(cli.log_level).to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Ok(false) means the user declined or a precondition failed; errors are
/// genuine failures.
fn run(cli: &Cli) -> anyhow::Result<bool> {
    let cwd = env::current_dir().context("failed to resolve the current directory")?;

    let mut names = NameTable::bundled();
    if let Some(path) = &cli.dictionary {
        let pairs = fs::read_to_string(path)
            .with_context(|| format!("failed to read hash dictionary: {path:?}"))?;
        names
            .extend_from_pairs(&pairs)
            .with_context(|| format!("failed to parse hash dictionary: {path:?}"))?;
    }
    if let Some(path) = &cli.namelist {
        let listing = fs::read_to_string(path)
            .with_context(|| format!("failed to read name listing: {path:?}"))?;
        names.extend_from_listing(&listing);
    }

    println!("Preparing to unpack Dark Souls for modding...");
    println!("Examining current directory...");

    let already_unpacked: Vec<&str> = unpack::OUTPUT_DIRS
        .iter()
        .filter(|dir| cwd.join(dir).is_dir())
        .copied()
        .collect();

    let (exe_path, exe_status) = exe::classify_exe(&cwd)?;
    match exe_status {
        ExeStatus::Missing => {
            println!("Executable DARKSOULS.exe was not found. Check current directory and try again.");
            return Ok(false);
        }
        ExeStatus::Gfwl => {
            if !yes_no(
                cli,
                "Detected executable DATA.exe (GFWL version) is not supported. Continue anyway?",
            )? {
                return Ok(false);
            }
        }
        ExeStatus::Unknown => {
            if !yes_no(
                cli,
                "Executable does not match expected checksum. Continue anyway?",
            )? {
                return Ok(false);
            }
        }
        _ => {}
    }

    println!("Examining data archives...");
    let report = exe::check_archives(&cwd)?;
    if !report.missing.is_empty() {
        if report.present.is_empty()
            && matches!(exe_status, ExeStatus::Patched | ExeStatus::PatchedDebug)
            && already_unpacked.len() == unpack::OUTPUT_DIRS.len()
            && cwd.join(BACKUP_DIR).is_dir()
        {
            println!("Unpacking appears to have been previously completed. Exiting.");
            return Ok(true);
        }
        println!("The following archive files are missing. Check current directory and try again.");
        for name in &report.missing {
            println!(" * {name}");
        }
        return Ok(false);
    }
    for name in &report.present {
        if !report.matching.contains(name) {
            let prompt =
                format!("Archive file \"{name}\" does not match expected checksum. Continue anyway?");
            if !yes_no(cli, &prompt)? {
                return Ok(false);
            }
        }
    }

    if !already_unpacked.is_empty() {
        println!(
            "The following destination directories already exist and will be deleted before unpacking begins."
        );
        for dir in &already_unpacked {
            println!(" * {dir}");
        }
        if !yes_no(
            cli,
            "The current contents of these directories WILL be lost. Continue anyway?",
        )? {
            return Ok(false);
        }
    }

    let mut should_make_backups = true;
    if cwd.join(BACKUP_DIR).is_dir() {
        let prompt = format!(
            "Backup directory \"{BACKUP_DIR}\" already exists. Backed-up copies of current files will not be created. Continue anyway?"
        );
        if yes_no(cli, &prompt)? {
            should_make_backups = false;
        } else {
            return Ok(false);
        }
    }

    let temp_dir = cwd.join(unpack::TEMP_DIR);
    if temp_dir.is_dir() {
        let prompt = format!(
            "Temp directory \"{}\" already exists and will be deleted. Continue anyway?",
            unpack::TEMP_DIR
        );
        if !yes_no(cli, &prompt)? {
            return Ok(false);
        }
        fs::remove_dir_all(&temp_dir).context("failed to remove the temp directory")?;
    }

    if should_make_backups {
        println!("Making backups...");
        let mut files = vec![exe_path.clone()];
        files.extend(report.present.iter().map(|name| cwd.join(name)));
        make_backups(&cwd, &files)?;
    } else {
        println!("Skipping backing-up important files.");
    }

    if matches!(exe_status, ExeStatus::Patched | ExeStatus::PatchedDebug) {
        println!("Skipping modifying executable (checksum matches processed executable).");
    } else {
        println!("Modifying executable...");
        exe::patch_executable(&exe_path, exe_status)?;
        let expected = match exe_status {
            ExeStatus::Pristine => Some(ExeStatus::Patched),
            ExeStatus::PristineDebug => Some(ExeStatus::PatchedDebug),
            _ => None,
        };
        if let Some(expected) = expected {
            println!("Verifying modifications...");
            let (_, patched_status) = exe::classify_exe(&cwd)?;
            if patched_status != expected
                && !yes_no(
                    cli,
                    "Modified executable does not match expected checksum. Continue anyway?",
                )?
            {
                return Ok(false);
            }
        } else {
            println!("Skipping checksum verification of non-standard executable.");
        }
    }

    if !already_unpacked.is_empty() {
        println!("Deleting existing unpacked archive directories...");
        for dir in &already_unpacked {
            fs::remove_dir_all(cwd.join(dir))
                .with_context(|| format!("failed to remove directory: {dir}"))?;
        }
    }

    println!("Unpacking archives...");
    unpack::create_output_dirs(&cwd)?;
    let mut unpacker = Unpacker::new(&cwd, &names);
    unpacker.run()?;

    println!("Removing archives...");
    for (header, data) in unpack::archive_pairs() {
        remove_if_present(&cwd.join(header))?;
        remove_if_present(&cwd.join(data))?;
    }

    if !cli.keep_temp
        && yes_no(
            cli,
            &format!("Remove the temp directory \"{}\"?", unpack::TEMP_DIR),
        )?
    {
        fs::remove_dir_all(&temp_dir).context("failed to remove the temp directory")?;
    }

    println!("Unpacking completed.");
    Ok(true)
}

fn yes_no(cli: &Cli, prompt: &str) -> anyhow::Result<bool> {
    if cli.assume_yes {
        println!("{prompt} [Y]es / [N]o  yes (assumed)");
        return Ok(true);
    }
    loop {
        print!("{prompt} [Y]es / [N]o  ");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            // Stdin closed: treat as a declination.
            return Ok(false);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "ye" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("Unknown response. Respond [Y]es / [N]o."),
        }
    }
}

fn make_backups(cwd: &Path, files: &[PathBuf]) -> anyhow::Result<()> {
    let backup = cwd.join(BACKUP_DIR);
    if backup.is_dir() {
        fs::remove_dir_all(&backup).context("failed to clear the backup directory")?;
    }
    fs::create_dir_all(&backup).context("failed to create the backup directory")?;
    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        println!(" - Backing up file {name:?}...");
        fs::copy(file, backup.join(name))
            .with_context(|| format!("failed to back up file: {file:?}"))?;
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> anyhow::Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result.with_context(|| format!("failed to remove file: {path:?}")),
    }
}
