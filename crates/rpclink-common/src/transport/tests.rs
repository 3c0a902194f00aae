//! Tests for the transport layer: codec plus framing over an in-memory pipe.

#[cfg(test)]
mod tests {
    use crate::protocol::{Request, Response};
    use crate::transport::{
        read_frame, write_frame, Codec, Frame, FrameKind, JsonCodec, MAX_FRAME_SIZE,
    };
    use serde_json::json;

    #[test]
    fn test_encode_decode_request() {
        let original = Request::new("test_method", json!({"arg": 42, "data": "hello"}));

        let encoded = JsonCodec.encode_request(&original).unwrap();
        assert!(!encoded.is_empty());

        let decoded = JsonCodec.decode_request(&encoded).unwrap();
        assert_eq!(original.method, decoded.method);
        assert_eq!(original.args, decoded.args);
        assert_eq!(original.id, decoded.id);
    }

    #[test]
    fn test_invalid_request_data_returns_error() {
        let invalid_data = vec![0xFF, 0xFF, 0xFF, 0xFF];
        assert!(JsonCodec.decode_request(&invalid_data).is_err());
    }

    #[test]
    fn test_invalid_response_data_returns_error() {
        assert!(JsonCodec.decode_response(&[0x00]).is_err());
    }

    #[tokio::test]
    async fn test_encoded_request_travels_in_frame() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let request = Request::new("echo", json!({"n": 1}));
        let payload = JsonCodec.encode_request(&request).unwrap();

        write_frame(&mut client, &Frame::request(42, payload)).await.unwrap();

        let frame = read_frame(&mut server, MAX_FRAME_SIZE).await.unwrap().unwrap();
        assert_eq!(frame.stream_id, 42);
        assert_eq!(frame.kind, FrameKind::Request);
        assert_eq!(JsonCodec.decode_request(&frame.payload).unwrap(), request);
    }

    #[tokio::test]
    async fn test_several_frames_keep_their_boundaries() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let response = Response::success(9, json!("done"));
        let payload = JsonCodec.encode_response(&response).unwrap();
        write_frame(&mut client, &Frame::response(1, payload))
            .await
            .unwrap();
        write_frame(&mut client, &Frame::error(2, "no such stream"))
            .await
            .unwrap();
        write_frame(&mut client, &Frame::fire_and_forget(3, Vec::new()))
            .await
            .unwrap();
        drop(client);

        let first = read_frame(&mut server, MAX_FRAME_SIZE).await.unwrap().unwrap();
        assert_eq!(JsonCodec.decode_response(&first.payload).unwrap(), response);

        let second = read_frame(&mut server, MAX_FRAME_SIZE).await.unwrap().unwrap();
        assert_eq!(second.kind, FrameKind::Error);
        assert_eq!(second.payload, b"no such stream");

        let third = read_frame(&mut server, MAX_FRAME_SIZE).await.unwrap().unwrap();
        assert_eq!(third.kind, FrameKind::FireAndForget);
        assert!(third.payload.is_empty());

        assert!(read_frame(&mut server, MAX_FRAME_SIZE).await.unwrap().is_none());
    }
}
