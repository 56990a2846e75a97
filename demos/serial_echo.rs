//! Simple serial I/O example.
//!
//! Opens the first FT232R/BM device, sends "Hello!\r\n", and prints
//! whatever comes back within two seconds.
//!
//! Usage: cargo run --example serial_echo

use std::time::Duration;

use ftdi_serial::{pid, DataBits, FtdiSerial, Parity, SerialOptions, Signals, StopBits, FTDI_VID};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Opening FTDI device...");
    let opts = SerialOptions::new()
        .baud_rate(115_200)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None);
    let mut port = FtdiSerial::open_device(FTDI_VID, pid::FT232, opts).await?;
    println!("Opened: {port:?}");
    println!("Configured: 115200 8N1");

    port.set_signals(Signals {
        data_terminal_ready: Some(true),
        request_to_send: Some(true),
    })
    .await?;

    let mut disconnect = port.disconnect_listener();
    let (Some(mut reader), Some(mut writer)) = (port.readable(), port.writable()) else {
        return Err("serial channels unavailable".into());
    };

    let msg = b"Hello from ftdi-serial!\r\n";
    writer.write(msg).await?;
    println!("Sent {} bytes", msg.len());

    let deadline = tokio::time::sleep(Duration::from_secs(2));
    tokio::pin!(deadline);
    let mut received = 0usize;
    loop {
        tokio::select! {
            chunk = reader.read_chunk() => match chunk {
                Some(bytes) => {
                    received += bytes.len();
                    println!("Received {} bytes: {:?}", bytes.len(), bytes);
                }
                None => break,
            },
            _ = disconnect.wait() => {
                println!("Device disconnected.");
                break;
            }
            _ = &mut deadline => break,
        }
    }
    if received == 0 {
        println!("No data received (timeout).");
    }

    drop(reader);
    drop(writer);
    port.close().await;
    Ok(())
}
