// SPDX-License-Identifier: GPL-3.0-or-later
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use log::{debug, error};
use std::{
    fs::{self, File, OpenOptions},
    io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write},
    os::unix::fs::FileTypeExt,
    path::Path,
};
use tpm2_proto::{Capability, Command, HashAlg, Handle, Name, PcrSelection, PcrSelector, Response, ResponseCode, Tag};
use tpm2_session::{Error as SessionError, RustCryptoProvider, SaltMaterial, Session, SessionKind};

/// Status for TPM command execution.
#[derive(Debug, strum_macros::Display, PartialEq)]
pub enum TpmError {
    /// Invalid data was received from the device.
    InvalidData,
    /// A read operation from the device failed.
    InvalidRead,
    /// A write operation to the device failed.
    InvalidWrite,
}

/// Reads and parses a TPM response from a device stream.
fn read_response<T>(file: &mut T) -> Result<Response, TpmError>
where
    T: Read + Write,
{
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).or(Err(TpmError::InvalidRead))?;

    if buf.len() < 10 {
        return Err(TpmError::InvalidData);
    }

    let tag_raw = u16::from_be_bytes([buf[0], buf[1]]);
    let size = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
    let rc_raw = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);

    if size as usize != buf.len() {
        return Err(TpmError::InvalidData);
    }

    let parameters = buf[10..].to_vec();

    Ok(Response {
        tag: Tag::from_repr(tag_raw),
        size,
        rc: ResponseCode::from(rc_raw),
        parameters,
    })
}

fn get_capability<T>(file: &mut T, property: u32, property_count: u32) -> Result<Vec<u32>, TpmError>
where
    T: Read + Write,
{
    let mut cmd = vec![];
    cmd.extend((Tag::NoSessions as u16).to_be_bytes());
    cmd.extend((22_u32).to_be_bytes());
    cmd.extend((Command::GetCapability as u32).to_be_bytes());
    cmd.extend((Capability::Handles as u32).to_be_bytes());
    cmd.extend(property.to_be_bytes());
    cmd.extend(property_count.to_be_bytes());
    file.write_all(&cmd).or(Err(TpmError::InvalidWrite))?;

    let response = read_response(file)?;
    let parameters = response.parameters;

    if parameters.len() < 9 || ((parameters.len() - 9) & 0x03) != 0 {
        return Err(TpmError::InvalidData);
    }

    let handles_count =
        u32::from_be_bytes([parameters[5], parameters[6], parameters[7], parameters[8]]) as usize;
    if handles_count != ((parameters.len() - 9) >> 2) {
        return Err(TpmError::InvalidData);
    }

    if handles_count > property_count as usize {
        return Err(TpmError::InvalidData);
    }

    let mut handles = vec![];
    for i in 0..handles_count {
        let j: usize = 9 + i * 4;
        let handle = u32::from_be_bytes([
            parameters[j],
            parameters[j + 1],
            parameters[j + 2],
            parameters[j + 3],
        ]);
        handles.push(handle);
    }

    Ok(handles)
}

struct Device(File);

impl Device {
    pub fn open(path: &str) -> IoResult<Device> {
        let path = Path::new(path);
        if !path.exists() {
            return Err(IoError::from(ErrorKind::InvalidInput));
        }
        let Ok(metadata) = fs::metadata(path) else {
            return Err(IoError::from(ErrorKind::InvalidInput));
        };
        if !metadata.file_type().is_char_device() {
            return Err(IoError::from(ErrorKind::InvalidInput));
        }
        let Ok(path) = std::fs::canonicalize(path) else {
            return Err(IoError::from(ErrorKind::InvalidInput));
        };
        debug!("{}", path.to_str().unwrap());
        Ok(Device(
            OpenOptions::new().read(true).write(true).open(path)?,
        ))
    }
}

/// Adapts `Device` to the session core's transport contract by wrapping the
/// same write-then-`read_response` round trip `get_capability` already uses.
impl tpm2_session::Transport for Device {
    fn send(&mut self, cmd: &[u8]) -> tpm2_session::Result<(Vec<u8>, ResponseCode)> {
        self.0
            .write_all(cmd)
            .map_err(|err| SessionError::TransportFailure(err.to_string()))?;
        let response = read_response(&mut self.0).map_err(|err| SessionError::TransportFailure(err.to_string()))?;
        Ok((response.parameters, response.rc))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "/dev/tpmrm0")]
    device: String,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode response code
    Rc {
        /// Response code
        #[arg(value_parser = maybe_hex::<u32>)]
        rc: u32,
    },
    /// Enumerate objects
    List {
        /// Transient handles
        #[arg(short, long)]
        transient: bool,
        /// Persistent handles
        #[arg(short, long)]
        persistent: bool,
    },
    /// Unseal a sealed data object behind a PCR-bound policy session
    Unseal {
        /// Handle of the already-loaded sealed object
        #[arg(value_parser = maybe_hex::<u32>)]
        handle: u32,
        /// The object's TPM name, hex-encoded
        #[arg(long)]
        name: String,
        /// The object's authorization value, if it has one
        #[arg(long, default_value = "")]
        auth: String,
        /// PCR indices the object's policy is bound to (bank is always SHA-256)
        #[arg(long, value_delimiter = ',')]
        pcr: Vec<u8>,
    },
}

const MAX_HANDLES: u32 = 16;

fn decode_hex(input: &str) -> Result<Vec<u8>, String> {
    if input.len() % 2 != 0 {
        return Err("hex string must have an even number of digits".into());
    }
    (0..input.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&input[i..i + 2], 16).map_err(|err| err.to_string()))
        .collect()
}

fn run_unseal(device: &str, handle: u32, name: &str, auth: &str, pcr: &[u8]) -> Result<Vec<u8>, String> {
    let mut chip = Device::open(device).map_err(|err| err.to_string())?;
    let crypto = RustCryptoProvider;
    let entity_name = Name::from(decode_hex(name)?);
    let pcr_selection = if pcr.is_empty() {
        PcrSelection::empty()
    } else {
        PcrSelection::single(PcrSelector::new(HashAlg::Sha256, pcr))
    };

    let mut session = Session::start(
        &mut chip,
        &crypto,
        SessionKind::Policy,
        None::<SaltMaterial>,
        None,
        tpm2_proto::Algorithm::Null,
        HashAlg::Sha256,
    )
    .map_err(|err| err.to_string())?;

    debug!("session {:#010x} opened for unseal of {handle:#010x}", session.handle());

    let result = session.exchange(
        &mut chip,
        &crypto,
        Command::Unseal as u32,
        handle,
        &entity_name,
        auth.as_bytes(),
        b"",
        tpm2_proto::SessionAttributes::empty(),
        Some(&pcr_selection),
    );

    session.close(&mut chip);

    let (rc, params) = result.map_err(|err| err.to_string())?;
    if rc != ResponseCode::Success {
        return Err(format!("unseal failed: {rc}"));
    }
    Ok(params)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match &cli.command {
        Commands::Rc { rc } => {
            println!("{} {rc:#010x}", ResponseCode::from(*rc));
        }
        Commands::List {
            transient,
            persistent,
        } => {
            let mut chip = Device::open(&cli.device).unwrap_or_else(|err| {
                error!("{err}");
                std::process::exit(1);
            });
            if *transient {
                let handles = get_capability(&mut chip.0, Handle::Transient as u32, MAX_HANDLES)
                    .unwrap_or_else(|err| {
                        error!("{err:?}");
                        std::process::exit(1);
                    });
                for handle in handles {
                    println!("{handle:#010x}");
                }
            }
            if *persistent {
                let handles =
                    get_capability(&mut chip.0, Handle::Persistent as u32, MAX_HANDLES)
                        .unwrap_or_else(|err| {
                            error!("{err:?}");
                            std::process::exit(1);
                        });
                for handle in handles {
                    println!("{handle:#010x}");
                }
            }
        }
        Commands::Unseal {
            handle,
            name,
            auth,
            pcr,
        } => {
            let plaintext = run_unseal(&cli.device, *handle, name, auth, pcr).unwrap_or_else(|err| {
                error!("{err}");
                std::process::exit(1);
            });
            std::io::stdout().write_all(&plaintext).unwrap_or_else(|err| {
                error!("{err}");
                std::process::exit(1);
            });
        }
    }
}
