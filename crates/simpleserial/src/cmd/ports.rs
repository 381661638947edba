use simpleserial_transport::list_available_ports;

use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_ports, OutputFormat};

/// Printed in place of an empty port list.
const NO_PORTS: &str = "-";

pub fn run(format: OutputFormat) -> CliResult<i32> {
    let ports = list_available_ports().map_err(|err| transport_error("enumerate ports", err))?;
    print_ports(&or_placeholder(ports), format);
    Ok(SUCCESS)
}

fn or_placeholder(ports: Vec<String>) -> Vec<String> {
    if ports.is_empty() {
        vec![NO_PORTS.to_string()]
    } else {
        ports
    }
}
