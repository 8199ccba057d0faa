/*
 * tpx3-interpret - bin/tpx3-interpret.rs
 *
 * Copyright (C) 2024 Timepix3 Interpret Contributors
 *
 * This library is free software: you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public License
 * as published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library.  If not, see
 * <http://www.gnu.org/licenses/>.
 */

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;
use simple_logger::SimpleLogger;

use tpx3_interpret::{run, Hdf5Container};

/// Decode a Timepix3 raw readout stream into a sorted hit table.
#[derive(Parser, Debug)]
#[command(name = "tpx3-interpret", version, about)]
struct Args {
    /// Input HDF5 file holding raw_data, meta_data and configuration.
    input: PathBuf,
    /// Output HDF5 file to write the interpreted hit table into.
    output: PathBuf,

    /// Number of decode workers. Defaults to four.
    #[arg(short, long)]
    workers: Option<usize>,
}

fn has_h5_extension(path: &std::path::Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("h5")
}

/// Run the pipeline into a sibling temp path, only renaming it onto
/// `output_path` once every write has succeeded, so a failure never
/// leaves a half-written output file at the requested path.
fn run_into(input: &Hdf5Container, output_path: &PathBuf, workers: Option<usize>) -> Result<(), String> {
    let tmp_path = output_path.with_extension("h5.tmp");
    let result = (|| {
        let mut output = Hdf5Container::create(&tmp_path).map_err(|e| e.to_string())?;
        let summary = run(input, input, input, &mut output, workers).map_err(|e| e.to_string())?;
        output
            .copy_configuration_from(input)
            .map_err(|e| e.to_string())?;
        Ok(summary)
    })();

    match result {
        Ok(summary) => {
            std::fs::rename(&tmp_path, output_path).map_err(|e| e.to_string())?;
            println!(
                "wrote {} hits; discarded {} of {} raw words ({:.4}%)",
                summary.hits_written,
                summary.discarded_words,
                summary.total_words,
                summary.discarded_fraction() * 100.0
            );
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = Args::parse();

    if !has_h5_extension(&args.input) || !has_h5_extension(&args.output) {
        return Err("both input and output paths must end in .h5".to_string());
    }

    let input = Hdf5Container::open(&args.input).map_err(|e| e.to_string())?;
    run_into(&input, &args.output, args.workers)
}

fn main() -> ExitCode {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .expect("logger can only be initialized once");

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{msg}");
            eprintln!("tpx3-interpret: {msg}");
            ExitCode::FAILURE
        }
    }
}
