use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use simpleserial_frame::Message;
use simpleserial_link::{LinkError, Poller, SerialLink};
use simpleserial_transport::{ByteTransport, SerialTransport};

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

/// How long one wait on the queue (or one idle poll) lasts before the
/// Ctrl-C flag is checked again.
const TICK: Duration = Duration::from_millis(100);

/// Which messages to print and when to stop.
#[derive(Debug, Clone, Copy)]
struct Filter {
    title: Option<u8>,
    count: Option<usize>,
}

impl Filter {
    fn accepts(&self, message: &Message) -> bool {
        self.title.is_none_or(|title| title == message.title())
    }

    fn done(&self, printed: usize) -> bool {
        self.count.is_some_and(|count| printed >= count)
    }
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let filter = Filter {
        title: args.title,
        count: args.count,
    };
    let transport = SerialTransport::new(args.port.serial_config()?);
    let link_config = args.port.link_config()?;
    let port = args.port.port.clone();
    let mut print = |message: &Message| print_message(message, &port, format);

    if args.poll {
        let mut poller = Poller::with_config(transport, link_config.frame);
        poller
            .connect()
            .map_err(|err| link_error("connect failed", err))?;
        listen_polling(&mut poller, filter, &running, &mut print)
            .map_err(|err| link_error("receive failed", err))?;
        poller.close();
    } else {
        let mut link = SerialLink::new(transport, link_config);
        link.connect()
            .map_err(|err| link_error("connect failed", err))?;
        listen_queued(&mut link, filter, &running, &mut print)
            .map_err(|err| link_error("receive failed", err))?;
        let stats = link.stop().map_err(|err| link_error("stop failed", err))?;
        tracing::info!(
            decoded = stats.frames_decoded,
            discarded = stats.frames_discarded,
            skipped = stats.bytes_skipped,
            "receive loop stopped"
        );
    }

    Ok(SUCCESS)
}

fn listen_queued<T: ByteTransport + 'static>(
    link: &mut SerialLink<T>,
    filter: Filter,
    running: &AtomicBool,
    print: &mut dyn FnMut(&Message),
) -> Result<usize, LinkError> {
    link.start()?;
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) && !filter.done(printed) {
        let message = match link.take_message_timeout(TICK) {
            Ok(message) => message,
            Err(LinkError::Timeout(_)) => continue,
            Err(err) => return Err(err),
        };
        if filter.accepts(&message) {
            print(&message);
            printed = printed.saturating_add(1);
        }
    }

    Ok(printed)
}

fn listen_polling<T: ByteTransport>(
    poller: &mut Poller<T>,
    filter: Filter,
    running: &AtomicBool,
    print: &mut dyn FnMut(&Message),
) -> Result<usize, LinkError> {
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) && !filter.done(printed) {
        let Some(message) = poller.poll()? else {
            std::thread::sleep(TICK);
            continue;
        };
        if filter.accepts(&message) {
            print(&message);
            printed = printed.saturating_add(1);
        }
    }

    Ok(printed)
}
