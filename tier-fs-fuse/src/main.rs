mod cli;

use std::error::Error;
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use spin::Mutex;
use tier_fs::{consts::SECTOR_SIZE, FileKind, FileSystem};
use tier_fs_fuse::BlockFile;

use cli::{Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    SimpleLogger::new().with_level(level).init().unwrap();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if let Command::Format { sectors } = cli.command {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&cli.image)?;
        file.set_len((sectors * SECTOR_SIZE) as u64)?;
        let device = Arc::new(BlockFile(std::sync::Mutex::new(file)));
        FileSystem::format(device, sectors);
        println!("formatted {} ({} sectors)", cli.image.display(), sectors);
        return Ok(());
    }

    let file = OpenOptions::new().read(true).write(true).open(&cli.image)?;
    let sectors = file.metadata()?.len() as usize / SECTOR_SIZE;
    let device = Arc::new(BlockFile(std::sync::Mutex::new(file)));
    // one lock around the whole file system; the layers below do none of
    // their own locking
    let fs = Mutex::new(FileSystem::mount(device, sectors));

    match cli.command {
        Command::Format { .. } => unreachable!("handled above"),
        Command::Create { name, size } => fs.lock().create(&name, size, FileKind::File)?,
        Command::Mkdir { name } => fs.lock().create_dir(&name)?,
        Command::Rm { name } => fs.lock().remove(&name, FileKind::File)?,
        Command::Rmdir { name } => fs.lock().remove_dir(&name)?,
        Command::Rename { old, new } => fs.lock().rename(&old, &new)?,
        Command::Cd { name } => fs.lock().change_dir(&name)?,
        Command::Ls => {
            for name in fs.lock().list() {
                println!("{name}");
            }
        }
        Command::Print => print!("{}", fs.lock().report()),
        Command::Put { source, name } => {
            let data = std::fs::read(&source)?;
            let name = match name {
                Some(name) => name,
                None => source
                    .file_name()
                    .ok_or("source has no file name")?
                    .to_string_lossy()
                    .into_owned(),
            };
            let mut fs = fs.lock();
            fs.create(&name, data.len(), FileKind::File)?;
            let file = fs.open(&name)?;
            let written = file.write_at(0, &data);
            println!("wrote {written} bytes to {name}");
        }
    }
    Ok(())
}
