use confmesh_signaling::{
    ChannelEvent, Frame, IceCandidate, Member, SessionDescription, Whisper, WhisperPayload,
};

const CHANNEL: &str = "presence-meeting.7";

/// Roster frames keep member order and names
#[test]
fn test_here_frame() {
    let members = vec![Member::new("1", "Alice"), Member::new("2", "Bob")];
    let frame = Frame::from_event(CHANNEL, &ChannelEvent::Here(members.clone())).unwrap();
    assert_eq!(frame.event, Frame::SUBSCRIPTION_SUCCEEDED);
    assert_eq!(frame.channel, CHANNEL);
    assert_eq!(frame.data["presence"]["count"], 2);

    let text = frame.serialize().unwrap();
    let decoded = Frame::deserialize(&text).unwrap().into_event().unwrap();
    assert_eq!(decoded, ChannelEvent::Here(members));
}

/// Roster frames produced by a Laravel backend use numeric ids
#[test]
fn test_here_frame_numeric_ids() {
    let text = r#"{
        "event": "pusher_internal:subscription_succeeded",
        "channel": "presence-meeting.7",
        "data": {"presence": {"count": 1, "ids": [3], "hash": {"3": {"name": "Carol"}}}}
    }"#;
    let event = Frame::deserialize(text).unwrap().into_event().unwrap();
    match event {
        ChannelEvent::Here(members) => {
            assert_eq!(members, vec![Member::new("3", "Carol")]);
        }
        other => panic!("Expected Here event, got {other:?}"),
    }
}

#[test]
fn test_member_frames() {
    let member = Member::new("9", "Dan");
    for event in [
        ChannelEvent::Joining(member.clone()),
        ChannelEvent::Leaving(member.clone()),
    ] {
        let frame = Frame::from_event(CHANNEL, &event).unwrap();
        let decoded = frame.into_event().unwrap();
        assert_eq!(decoded, event);
    }
}

/// A removal frame without user_info still yields a member
#[test]
fn test_member_removed_without_info() {
    let text = r#"{"event": "pusher_internal:member_removed", "channel": "x", "data": {"user_id": "4"}}"#;
    let event = Frame::deserialize(text).unwrap().into_event().unwrap();
    assert_eq!(event, ChannelEvent::Leaving(Member::new("4", "")));
}

#[test]
fn test_whisper_frames() {
    let payloads = [
        WhisperPayload::Offer(SessionDescription::offer("v=0\r\no=- 1 1 IN IP4 0.0.0.0")),
        WhisperPayload::Answer(SessionDescription::answer("v=0")),
        WhisperPayload::Candidate(IceCandidate {
            candidate: "candidate:0 1 udp 2122260223 192.168.1.2 54400 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }),
    ];
    for payload in payloads {
        let whisper = Whisper::new("a", "b", payload);
        let event = ChannelEvent::Whisper(whisper.clone());
        let frame = Frame::from_event(CHANNEL, &event).unwrap();
        assert_eq!(frame.event, whisper.kind().event_name());
        let decoded = Frame::deserialize(&frame.serialize().unwrap())
            .unwrap()
            .into_event()
            .unwrap();
        assert_eq!(decoded, event);
    }
}

/// The event name and the payload key must agree
#[test]
fn test_whisper_event_mismatch() {
    let whisper = Whisper::new(
        "a",
        "b",
        WhisperPayload::Answer(SessionDescription::answer("v=0")),
    );
    let mut frame = Frame::from_event(CHANNEL, &ChannelEvent::Whisper(whisper)).unwrap();
    frame.event = "client-offer".to_string();
    assert!(frame.into_event().is_err());
}

#[test]
fn test_error_frame() {
    let frame = Frame::from_event(CHANNEL, &ChannelEvent::Error("boom".to_string())).unwrap();
    assert_eq!(frame.event, Frame::ERROR);
    assert_eq!(
        frame.into_event().unwrap(),
        ChannelEvent::Error("boom".to_string())
    );

    let text = r#"{"event": "pusher:error", "data": {"code": 4004}}"#;
    let event = Frame::deserialize(text).unwrap().into_event().unwrap();
    assert_eq!(event, ChannelEvent::Error("Unknown channel error".to_string()));
}

#[test]
fn test_unknown_frames() {
    let text = r#"{"event": "pusher:ping", "data": {}}"#;
    assert!(Frame::deserialize(text).unwrap().into_event().is_err());
    assert!(Frame::deserialize("not json").is_err());

    let text = r#"{"event": "pusher_internal:subscription_succeeded", "data": {}}"#;
    assert!(Frame::deserialize(text).unwrap().into_event().is_err());
}
