#![deny(
    rust_2018_idioms,
    unreachable_pub,
    unsafe_code,
    unused_imports,
    unused_mut,
    missing_debug_implementations
)]

use anyhow::Context;
use bytes::Bytes;
use cmvs::{magic::Archive, scheme::database::SchemeDatabase};
use colored::*;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io::Write;
use std::{
    fs::File,
    path::{Component, Path, PathBuf},
};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt()]
struct Opt {
    /// Archives to process
    #[structopt(required = true, name = "ARCHIVES", parse(from_os_str))]
    files: Vec<PathBuf>,

    /// Directory to output extracted files
    #[structopt(
        short = "o",
        long = "output",
        parse(from_os_str),
        default_value = "ext/"
    )]
    output_dir: PathBuf,

    /// JSON file with encryption schemes, replaces the bundled ones
    #[structopt(short, long, parse(from_os_str))]
    schemes: Option<PathBuf>,

    /// Only list archive contents
    #[structopt(short, long)]
    list: bool,
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    match load_database(&opt).and_then(|db| extract_archives(&opt, &db)) {
        Ok(_) => (),
        Err(err) => log::error!("Error while extracting: {}", err),
    }
}

fn load_database(opt: &Opt) -> anyhow::Result<SchemeDatabase> {
    match &opt.schemes {
        Some(path) => SchemeDatabase::from_json(
            &std::fs::read(path)
                .with_context(|| format!("Could not read {:?}", path))?,
        ),
        None => SchemeDatabase::bundled(),
    }
}

fn extract_archives(opt: &Opt, database: &SchemeDatabase) -> anyhow::Result<()> {
    opt.files
        .iter()
        .filter(|file| file.is_file())
        .try_for_each(|file| {
            let buf = Bytes::from(std::fs::read(&file)?);
            let archive_magic = Archive::parse(&buf);
            log::debug!(
                "Archive: {:?}, version {:?}",
                archive_magic,
                archive_magic.version()
            );
            let opener = match archive_magic.get_opener(database) {
                Some(opener) => opener,
                None => {
                    println!(
                        "{}",
                        format!("{:?} is not a CPZ archive, skipping", file)
                            .yellow()
                    );
                    return Ok(());
                }
            };
            log::debug!("Opener: {}", opener.get_name());

            let archive = match opener.open(buf, file) {
                Ok(Some(archive)) => archive,
                Ok(None) => {
                    println!(
                        "{}",
                        format!("{:?} is damaged or not supported", file).red()
                    );
                    return Ok(());
                }
                Err(err) => {
                    log::error!("{:?}: {}", file, err);
                    return Ok(());
                }
            };
            let files = archive.entries();
            if opt.list {
                println!("{}", format!("{:?}", file).green());
                files.iter().for_each(|entry| {
                    println!(
                        " {:>10} {}",
                        entry.file_size,
                        entry.full_path.display()
                    )
                });
                return Ok(());
            }

            let progress_bar = init_progressbar(
                &format!("Extracting: {:?}", file),
                files.len() as u64,
            );
            files
                .par_iter()
                .progress_with(progress_bar)
                .try_for_each(|entry| {
                    let buf = archive.extract(entry)?;
                    write_entry(&opt.output_dir, &entry.full_path, &buf)
                })
        })
}

fn write_entry(
    output_dir: &Path,
    full_path: &Path,
    buf: &[u8],
) -> anyhow::Result<()> {
    if full_path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        anyhow::bail!("Refusing to write {:?} outside the output directory", full_path);
    }
    let mut output_file_name = PathBuf::from(output_dir);
    output_file_name.push(full_path);
    std::fs::create_dir_all(
        &output_file_name
            .parent()
            .context("Could not get parent directory")?,
    )?;
    log::debug!("Extracting resource: {:?}", output_file_name);
    File::create(output_file_name)?.write_all(buf)?;
    Ok(())
}

fn init_progressbar(prefix: &str, size: u64) -> ProgressBar {
    let progress_bar = ProgressBar::new(size).with_style(
        ProgressStyle::default_bar().template(
            " {spinner} {prefix} {wide_bar:} {pos:>6}/{len:6} ETA:[{eta}]",
        ),
    );
    progress_bar.set_prefix(prefix);
    progress_bar
}
