//! MeshSession over an in-memory link, with a hand-driven device end.

use std::time::Duration;

use mccli::error::SessionError;
use mccli::session::{DeviceSession, LinkChannels, MeshSession};
use mccli_protocol::{
    Command, FrameCodec, PushNotification, Response, HOST_FRAME_MARKER, MAX_PATH_SIZE, NAME_FIELD_SIZE, PUSH_CODE_MSG_WAITING,
    RESP_CODE_CONTACT, RESP_CODE_CONTACTS_START, RESP_CODE_CURR_TIME, RESP_CODE_END_OF_CONTACTS,
};

/// Read one host frame from the device end and return its payload.
async fn next_command(device: &mut LinkChannels, buffer: &mut Vec<u8>) -> Vec<u8> {
    loop {
        if buffer.len() >= 3 {
            assert_eq!(buffer[0], HOST_FRAME_MARKER);
            let len = u16::from_le_bytes([buffer[1], buffer[2]]) as usize;
            if buffer.len() >= 3 + len {
                let frame: Vec<u8> = buffer.drain(..3 + len).collect();
                return frame[3..].to_vec();
            }
        }
        let chunk = device.inbound.recv().await.expect("host hung up");
        buffer.extend_from_slice(&chunk);
    }
}

async fn reply(device: &LinkChannels, payload: &[u8]) {
    device.outbound.send(FrameCodec::encode_device(payload)).await.unwrap();
}

fn contact_frame(key: u8, name: &str) -> Vec<u8> {
    let mut frame = vec![RESP_CODE_CONTACT];
    frame.extend_from_slice(&[key; 32]);
    frame.push(1); // chat
    frame.push(0); // flags
    frame.push(0xFF); // flood
    frame.extend_from_slice(&[0; MAX_PATH_SIZE]);
    let mut padded = [0u8; NAME_FIELD_SIZE];
    padded[..name.len()].copy_from_slice(name.as_bytes());
    frame.extend_from_slice(&padded);
    frame.extend_from_slice(&1_700_000_000u32.to_le_bytes());
    frame
}

#[tokio::test]
async fn test_reply_and_push_are_split() {
    let (host, mut device) = LinkChannels::pair();
    let session = MeshSession::start(host, Duration::from_secs(1));
    let mut events = session.take_events().unwrap();
    assert!(session.take_events().is_none());

    let device_task = tokio::spawn(async move {
        let mut buffer = Vec::new();
        let frame = next_command(&mut device, &mut buffer).await;
        assert_eq!(frame, Command::GetDeviceTime.encode());
        // Push first, then the reply, in one chunk
        let mut chunk = FrameCodec::encode_device(&[PUSH_CODE_MSG_WAITING]);
        let mut time = vec![RESP_CODE_CURR_TIME];
        time.extend_from_slice(&1234u32.to_le_bytes());
        chunk.extend(FrameCodec::encode_device(&time));
        device.outbound.send(chunk).await.unwrap();
        device
    });

    let response = session.request(Command::GetDeviceTime).await.unwrap();
    assert_eq!(response, Response::CurrentTime { time_secs: 1234 });
    assert_eq!(events.recv().await, Some(PushNotification::MessageWaiting));
    device_task.await.unwrap();
}

#[tokio::test]
async fn test_contacts_are_collected() {
    let (host, mut device) = LinkChannels::pair();
    let session = MeshSession::start(host, Duration::from_secs(1));

    let device_task = tokio::spawn(async move {
        let mut buffer = Vec::new();
        next_command(&mut device, &mut buffer).await;
        let mut start = vec![RESP_CODE_CONTACTS_START];
        start.extend_from_slice(&2u32.to_le_bytes());
        reply(&device, &start).await;
        reply(&device, &contact_frame(0xA1, "alice")).await;
        reply(&device, &contact_frame(0xB2, "bob")).await;
        reply(&device, &[RESP_CODE_END_OF_CONTACTS]).await;
        device
    });

    let contacts = session.list_contacts().await.unwrap();
    let names: Vec<&str> = contacts.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert!(!contacts[0].has_direct_path());
    device_task.await.unwrap();
}

#[tokio::test]
async fn test_absurd_contact_count_is_harmless() {
    let (host, mut device) = LinkChannels::pair();
    let session = MeshSession::start(host, Duration::from_secs(1));

    let device_task = tokio::spawn(async move {
        let mut buffer = Vec::new();
        next_command(&mut device, &mut buffer).await;
        let mut start = vec![RESP_CODE_CONTACTS_START];
        start.extend_from_slice(&u32::MAX.to_le_bytes());
        reply(&device, &start).await;
        reply(&device, &contact_frame(0xC3, "carol")).await;
        reply(&device, &[RESP_CODE_END_OF_CONTACTS]).await;
        device
    });

    let contacts = session.list_contacts().await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].name, "carol");
    device_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_silent_device_is_no_reply() {
    let (host, _device) = LinkChannels::pair();
    let session = MeshSession::start(host, Duration::from_secs(5));

    let result = session.request(Command::GetDeviceTime).await;
    assert_eq!(result, Err(SessionError::NoReply(Duration::from_secs(5))));
}

#[tokio::test]
async fn test_dropped_link_is_closed() {
    let (host, device) = LinkChannels::pair();
    let session = MeshSession::start(host, Duration::from_secs(5));
    drop(device);

    let result = session.request(Command::GetDeviceTime).await;
    assert_eq!(result, Err(SessionError::Closed));
}
