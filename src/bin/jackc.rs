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
use hacktools::jack::Parser;
use hacktools::util;

fn main() -> Result<(), Box<dyn Error>> {
    // Parse command-line arguments
    let matches = Command::new("jackc")
        .about("Jack to VM compiler for the Hack platform")
        .version("0.3.2")
        .arg(
            Arg::new("filename")
                .required(true)
                .help("A .jack file, or a directory of .jack files"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .help("Override the output path"),
        )
        .arg(arg!(-d --debug "Show verbose output"))
        .arg(
            Arg::new("outmode")
                .short('m')
                .long("outmode")
                .takes_value(true)
                .default_value("vm")
                .help("Output mode (vm or xml)"),
        )
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
    let xml = match matches.get_one::<String>("outmode").unwrap().as_str() {
        "vm" => false,
        "xml" => true,
        mode => {
            return Err(format!("unknown output mode '{}'", mode).into());
        }
    };
    let extension = if xml { "xml" } else { "vm" };
    let input = PathBuf::from(matches.get_one::<String>("filename").unwrap());
    let output = matches.get_one::<String>("output").map(PathBuf::from);
    // Collect the translation unit
    let files = util::collect_files(&input, "jack")?;
    if files.is_empty() {
        return Err(format!("no .jack files found in {}", input.display()).into());
    }
    // Compile each file in turn
    let mut outputs = Vec::new();
    for file in &files {
        let source = fs::read_to_string(file)?;
        let class = Parser::new(&source)
            .and_then(|p| p.parse())
            .map_err(|e| format!("{}: {}", file.display(), e))?;
        // Determine where this file's output goes.  For a directory
        // unit `--output` names a directory.
        let sibling = file.with_extension(extension);
        let target = match &output {
            Some(path) if input.is_dir() => path.join(sibling.file_name().unwrap()),
            Some(path) => path.clone(),
            None => sibling,
        };
        let text = if xml { class.xml } else { class.to_vm() };
        log::info!("compiled {} -> {}", file.display(), target.display());
        outputs.push((target, text));
    }
    // Commit the outputs only once the whole unit has compiled.
    for (target, text) in outputs {
        fs::write(&target, text)?;
    }
    // Done
    Ok(())
}
