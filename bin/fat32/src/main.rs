//! fat32 — read-only FAT32 image inspection tool.
//!
//! Thin front-end over `libfat32`: opens an image, then lists, prints,
//! exports, or mounts paths inside it. Exits 0 on success, 1 on any fatal
//! error with a single-line diagnostic on stderr.

mod logger;

use std::io::Write;
use std::process::ExitCode;

use libfat32::{DirectoryEntry, FileSystem};

const USAGE: &str = "\
Usage: fat32 [OPTIONS] [ACTION]

Actions (default: ls):
  ls       list the directory at --path
  cat      write the file at --path to stdout
  export   copy the file at --path to --export-path
  mount    mount the image read-only at --mount-path
  info     print the decoded BPB/EBPB/FSInfo summary

Options:
  -f, --file PATH         FAT32 image to open (required)
  -p, --path PATH         path inside the image (default: the root)
  -e, --export-path PATH  destination file for 'export'
  -m, --mount-path PATH   mount point for 'mount'
  -v, --verbose           debug logging (FAT32_LOG overrides)
  -h, --help              show this help
";

struct Args {
    file: String,
    path: String,
    export_path: Option<String>,
    mount_path: Option<String>,
    verbose: bool,
    action: String,
}

fn parse_args() -> Result<Args, String> {
    let mut file = None;
    let mut path = String::new();
    let mut export_path = None;
    let mut mount_path = None;
    let mut verbose = false;
    let mut action = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value_for = |flag: &str| iter.next().ok_or(format!("missing value for {flag}"));
        match arg.as_str() {
            "-f" | "--file" => file = Some(value_for("--file")?),
            "-p" | "--path" => path = value_for("--path")?,
            "-e" | "--export-path" => export_path = Some(value_for("--export-path")?),
            "-m" | "--mount-path" => mount_path = Some(value_for("--mount-path")?),
            "-v" | "--verbose" => verbose = true,
            flag if flag.starts_with('-') => return Err(format!("unknown option '{flag}'")),
            positional => {
                if action.is_some() {
                    return Err(format!("unexpected argument '{positional}'"));
                }
                action = Some(positional.to_string());
            }
        }
    }

    Ok(Args {
        file: file.ok_or("missing required option --file")?,
        path,
        export_path,
        mount_path,
        verbose,
        action: action.unwrap_or_else(|| "ls".to_string()),
    })
}

/// Look up a path and insist it names a file.
fn find_file(fs: &mut FileSystem, path: &str) -> Result<DirectoryEntry, String> {
    let entry = fs.find_entry(path).map_err(|e| format!("{path}: {e}"))?;
    if entry.is_directory() {
        return Err(format!("{path}: is a directory"));
    }
    Ok(entry)
}

/// Read a whole file; a chain that ends before the recorded size is an
/// error rather than silent truncation.
fn read_whole_file(fs: &mut FileSystem, path: &str) -> Result<Vec<u8>, String> {
    let entry = find_file(fs, path)?;
    let data = fs.read_to_end(&entry).map_err(|e| format!("{path}: {e}"))?;
    if data.len() != entry.size as usize {
        return Err(format!(
            "{path}: file data ends after {} of {} bytes",
            data.len(),
            entry.size
        ));
    }
    Ok(data)
}

fn run(args: Args) -> Result<(), String> {
    let mut fs = FileSystem::open(&args.file).map_err(|e| format!("{}: {e}", args.file))?;

    match args.action.as_str() {
        "ls" => {
            fs.change_directory(&args.path)
                .map_err(|e| format!("{}: {e}", args.path))?;
            let mut stdout = std::io::stdout().lock();
            for entry in fs.current_entries() {
                let suffix = if entry.is_directory() { "/" } else { "" };
                writeln!(stdout, "{}{suffix}", entry.name).map_err(|e| e.to_string())?;
            }
            Ok(())
        }
        "cat" => {
            let data = read_whole_file(&mut fs, &args.path)?;
            std::io::stdout().write_all(&data).map_err(|e| e.to_string())
        }
        "export" => {
            let dest = args
                .export_path
                .ok_or("export requires --export-path")?;
            let data = read_whole_file(&mut fs, &args.path)?;
            std::fs::write(&dest, data).map_err(|e| format!("{dest}: {e}"))?;
            Ok(())
        }
        "mount" => {
            let mount_path = args.mount_path.ok_or("mount requires --mount-path")?;
            mount(fs, &mount_path)
        }
        "info" => {
            println!("{}", fs.info());
            Ok(())
        }
        other => Err(format!("unknown action '{other}'")),
    }
}

#[cfg(feature = "fuse")]
fn mount(fs: FileSystem, mount_path: &str) -> Result<(), String> {
    // Re-parse on every callback so an image modified behind our back stays
    // coherent.
    libfat32::fuse::mount(
        fs,
        std::path::Path::new(mount_path),
        libfat32::fuse::RefreshPolicy::Always,
    )
    .map_err(|e| format!("{mount_path}: {e}"))
}

#[cfg(not(feature = "fuse"))]
fn mount(_fs: FileSystem, _mount_path: &str) -> Result<(), String> {
    Err("this build has no FUSE support; rebuild with --features fuse".to_string())
}

fn main() -> ExitCode {
    if std::env::args().any(|a| a == "-h" || a == "--help") {
        print!("{USAGE}");
        return ExitCode::SUCCESS;
    }
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("fat32: {message}");
            eprint!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    logger::init(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("fat32: {message}");
            ExitCode::FAILURE
        }
    }
}
