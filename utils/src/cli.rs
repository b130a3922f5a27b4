use clap::{Parser, Subcommand};
use data_encoding::HEXUPPER_PERMISSIVE;
use memscope_config::CellWidth;
use memscope_runtime::memory::Address;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file to use instead of the one in the storage directory
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    /// Preload a region from a file, as NAME=PATH
    #[clap(long = "image", global = true, value_parser = parse_image)]
    pub images: Vec<(String, PathBuf)>,
    #[command(subcommand)]
    pub action: CliAction,
}

#[derive(Clone, Subcommand)]
pub enum CliAction {
    /// List the regions of the address space
    Regions,
    /// Print memory starting at an address
    Dump {
        #[clap(value_parser = parse_address)]
        address: Address,
        /// Rows to print, overriding the configured viewport height
        #[clap(short, long)]
        rows: Option<u32>,
        #[clap(short, long, value_parser = parse_width)]
        width: Option<CellWidth>,
    },
    /// Write hex encoded bytes to an address and print the result
    Poke {
        #[clap(value_parser = parse_address)]
        address: Address,
        #[clap(value_parser = parse_bytes)]
        bytes: Vec<u8>,
    },
    /// Run a simulated core and keep refreshing the view of an address
    Watch {
        #[clap(value_parser = parse_address)]
        address: Address,
        #[clap(short, long, default_value_t = 8)]
        frames: u32,
    },
    #[clap(subcommand)]
    Config(ConfigAction),
}

#[derive(Clone, Subcommand)]
pub enum ConfigAction {
    /// Write the default config to the storage directory
    Init,
    /// Print the config in use
    Show,
}

pub fn parse_address(text: &str) -> Result<Address, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_prefix('$'))
        .unwrap_or(text)
        .replace('_', "");

    Address::from_str_radix(&digits, 16).map_err(|error| format!("{text:?}: {error}"))
}

fn parse_bytes(text: &str) -> Result<Vec<u8>, String> {
    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    HEXUPPER_PERMISSIVE
        .decode(text.as_bytes())
        .map_err(|error| error.to_string())
}

fn parse_width(text: &str) -> Result<CellWidth, String> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "byte" => Ok(CellWidth::Byte),
        "2" | "halfword" => Ok(CellWidth::Halfword),
        "4" | "word" => Ok(CellWidth::Word),
        _ => Err(format!("{text:?} is not a cell width")),
    }
}

fn parse_image(text: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = text
        .split_once('=')
        .ok_or_else(|| format!("{text:?} is not NAME=PATH"))?;

    Ok((name.to_string(), PathBuf::from(path)))
}
