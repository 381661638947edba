use std::fs;
use std::time::Duration;

use simpleserial_frame::Message;
use simpleserial_link::{LinkError, SerialLink};
use simpleserial_transport::{ByteTransport, SerialTransport};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, link_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait = if args.wait {
        Some(parse_duration(&args.wait_timeout)?)
    } else {
        None
    };
    let payload = resolve_payload(&args)?;

    let transport = SerialTransport::new(args.port.serial_config()?);
    let mut link = SerialLink::new(transport, args.port.link_config()?);
    link.connect()
        .map_err(|err| link_error("connect failed", err))?;

    let reply = exchange(&mut link, args.title, &payload, wait)
        .map_err(|err| link_error("send failed", err))?;
    if let Some(message) = reply {
        print_message(&message, link.transport_name(), format);
    }

    link.close();
    Ok(SUCCESS)
}

/// Send one frame; with `wait`, start receiving first and return the first
/// message that arrives.
fn exchange<T: ByteTransport + 'static>(
    link: &mut SerialLink<T>,
    title: u8,
    payload: &[u8],
    wait: Option<Duration>,
) -> Result<Option<Message>, LinkError> {
    let Some(timeout) = wait else {
        link.send(title, payload)?;
        return Ok(None);
    };

    link.start()?;
    link.send(title, payload)?;
    let reply = link.take_message_timeout(timeout)?;
    link.stop()?;
    Ok(Some(reply))
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of digits"));
    }

    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|text| u8::from_str_radix(text, 16).ok())
                .ok_or_else(|| CliError::new(USAGE, format!("--hex is not valid hex: {input}")))
        })
        .collect()
}
