//! Basic usage example for BitSound
//!
//! Run with: cargo run --example basic_usage
//! Set `RUST_LOG=bitsound=debug` to watch format sniffing.

use bitsound::transport::{send_packet, PacketReceiver};
use bitsound::*;
use std::io::Cursor;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("BitSound Basic Usage Example");
    println!("============================");

    // Example 1: Typed packet round trip
    println!("\n1. Packet Round Trip:");
    {
        let mut packet = Packet::new();
        packet
            .write_u32(42)
            .write_bool(true)
            .write_string("hi")
            .write_f64(-0.5);

        println!("  Encoded {} bytes: {:02x?}", packet.data_size(), packet.data());

        let id = packet.read_u32();
        let flag = packet.read_bool();
        let text = packet.read_string();
        let value = packet.read_f64();
        println!("  Decoded: id={id}, flag={flag}, text={text:?}, value={value}");
    }

    // Example 2: Reads past the end invalidate the packet
    println!("\n2. Short Reads:");
    {
        let mut packet = Packet::from(vec![0, 0, 0, 7]);
        println!("  First u32: {}", packet.read_u32());
        println!("  Second u32: {}", packet.read_u32());
        println!("  Still readable: {}", packet.can_read());
    }

    // Example 3: Stream framing
    println!("\n3. Stream Framing:");
    {
        let mut wire = Vec::new();
        for i in 0..3u16 {
            let mut packet = Packet::new();
            packet.write_u16(i).write_string("tick");
            send_packet(&mut wire, &packet, &mut Plain)?;
        }
        println!("  Wire bytes: {}", wire.len());

        let mut stream = Cursor::new(wire);
        let mut receiver = PacketReceiver::new();
        let mut packet = Packet::new();
        while receiver.receive(&mut stream, &mut packet, &mut Plain)? == Status::Done {
            println!("  Received: {} {:?}", packet.read_u16(), packet.read_string());
        }
    }

    // Example 4: Write and read back a FLAC file
    println!("\n4. Sound Files:");
    {
        let path = std::env::temp_dir().join("bitsound-demo.flac");
        let rate = 22_050;
        let tone: Vec<i16> = (0..rate)
            .map(|i| ((f64::from(i) * 0.0628).sin() * 8_000.0) as i16)
            .collect();

        let mut output = OutputSoundFile::new();
        output.open_from_file(&path, rate, 1, &[SoundChannel::Mono])?;
        output.write(&tone)?;
        output.close()?;
        println!("  Wrote {} ({} bytes)", path.display(), std::fs::metadata(&path)?.len());

        let mut input = InputSoundFile::from_file(&path)?;
        println!(
            "  Opened: {} samples, {} Hz, {} channel(s), {:?}",
            input.sample_count(),
            input.sample_rate(),
            input.channel_count(),
            input.duration()
        );

        input.seek(rate as u64 / 2)?;
        let mut block = [0i16; 4];
        let n = input.read(&mut block)?;
        println!("  Samples at {:?}: {:?}", input.time_offset(), &block[..n]);

        std::fs::remove_file(&path)?;
    }

    // Example 5: Unknown content
    println!("\n5. Format Detection:");
    {
        let mut input = InputSoundFile::new();
        match input.open_from_memory(vec![0x5Au8; 10]) {
            Err(Error::UnsupportedFormat) => println!("  Ten bytes of noise: no decoder"),
            other => println!("  Unexpected: {other:?}"),
        }
    }

    println!("\nAll examples completed successfully!");
    Ok(())
}
