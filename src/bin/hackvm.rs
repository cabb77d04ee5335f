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
use hacktools::util;
use hacktools::vm::{self, Translator};

fn main() -> Result<(), Box<dyn Error>> {
    // Parse command-line arguments
    let matches = Command::new("hackvm")
        .about("VM to assembly translator for the Hack platform")
        .version("0.3.2")
        .arg(
            Arg::new("filename")
                .required(true)
                .help("A .vm file, or a directory of .vm files"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .help("Override the output path"),
        )
        .arg(arg!(-d --debug "Show verbose output and annotate the generated assembly"))
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
    // Collect the translation unit
    let unit_is_dir = input.is_dir();
    let files = util::collect_files(&input, "vm")?;
    if files.is_empty() {
        return Err(format!("no .vm files found in {}", input.display()).into());
    }
    let mut translator = Translator::new(debug);
    // A directory unit boots through Sys.init.
    if unit_is_dir {
        translator.bootstrap();
    }
    // Translate each file onto the single output
    for file in &files {
        let source = fs::read_to_string(file)?;
        let instructions =
            vm::parse(&source).map_err(|e| format!("{}: {}", file.display(), e))?;
        translator.set_file(&util::file_stem(file));
        translator.translate_all(&instructions);
    }
    // Determine where the output goes
    let target = match output {
        Some(path) => path,
        None if unit_is_dir => {
            let name = input
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("out");
            input.join(format!("{}.asm", name))
        }
        None => input.with_extension("asm"),
    };
    fs::write(&target, translator.to_asm())?;
    log::info!("translated {} -> {}", input.display(), target.display());
    // Done
    Ok(())
}
