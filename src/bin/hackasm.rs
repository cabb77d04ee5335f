// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{arg, Arg, Command};
use log::LevelFilter;
//
use hacktools::asm;
use hacktools::util;

fn main() -> Result<(), Box<dyn Error>> {
    // Parse command-line arguments
    let matches = Command::new("hackasm")
        .about("Assembler for the Hack platform")
        .version("0.3.2")
        .arg(Arg::new("filename").required(true).help("A .asm file"))
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .help("Override the output path"),
        )
        .arg(arg!(-d --debug "Show verbose output"))
        .get_matches();
    // Extract top-level flags
    let debug = matches.is_present("debug");
    // Initialise logging
    util::init_logging(if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    });
    //
    let input = PathBuf::from(matches.get_one::<String>("filename").unwrap());
    let output = matches.get_one::<String>("output").map(PathBuf::from);
    // Read the input file
    let source = fs::read_to_string(&input)?;
    // Scan the assembly into instructions
    let instructions =
        asm::parse(&source).map_err(|e| format!("{}: {}", input.display(), e))?;
    // Resolve symbols and encode
    let words =
        asm::assemble(&instructions).map_err(|e| format!("{}: {}", input.display(), e))?;
    // Determine where the output goes
    let target = output.unwrap_or_else(|| input.with_extension("hack"));
    fs::write(&target, asm::to_hack(&words))?;
    log::info!("assembled {} -> {}", input.display(), target.display());
    // Done
    Ok(())
}
