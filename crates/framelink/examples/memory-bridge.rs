//! Bridge one primary to two secondaries entirely in memory.
//!
//! ```bash
//! cargo run -p framelink --example memory-bridge
//! ```

use framelink::bridge::{Bridge, BridgeConfig, BridgeError};
use framelink::frame::{decode, encode, MAX_PAYLOAD};
use framelink::port::{BoxedPort, MemoryPort};

fn main() -> Result<(), BridgeError> {
    let (device, device_handle) = MemoryPort::new("device");
    let (tool_a, tool_a_handle) = MemoryPort::new("tool-a");
    let (tool_b, tool_b_handle) = MemoryPort::new("tool-b");

    let secondaries: Vec<BoxedPort> = vec![Box::new(tool_a), Box::new(tool_b)];
    let mut bridge = Bridge::new(Box::new(device), secondaries, BridgeConfig::default())?;
    bridge.connect()?;

    // The device emits a frame; both tools see identical bytes.
    let frame = encode(b"temp=21.5").expect("payload fits in one frame");
    device_handle.push_inbound(&frame);
    bridge.poll_once();

    for (name, handle) in [("tool-a", &tool_a_handle), ("tool-b", &tool_b_handle)] {
        let bytes = handle.take_outbound();
        let payload = decode(&mut bytes.as_slice(), MAX_PAYLOAD)
            .expect("slice source never fails")
            .into_payload();
        println!("{name} received {:?}", payload.as_deref().map(String::from_utf8_lossy));
    }

    // Only tool-b answers; the device gets the reply, tool-a does not.
    tool_b_handle.push_inbound(&encode(b"ack").expect("payload fits in one frame"));
    bridge.poll_once();
    println!("device received {} bytes", device_handle.take_outbound().len());
    println!("tool-a received {} bytes", tool_a_handle.take_outbound().len());

    bridge.shutdown()?;
    println!("stats: {:?}", bridge.stats());
    Ok(())
}
