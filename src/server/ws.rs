//! WebSocket upgrade and the adapter from axum messages to hub frames.

use crate::context::AppContext;
use crate::hub::Frame;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{future, SinkExt, StreamExt};
use tracing::{error, info};

pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: AppContext) {
    let (sink, stream) = socket.split();

    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(into_message(frame))));
    let stream = stream.map(|msg| msg.map(from_message));

    match ctx.hub.attach(sink, stream, ctx.config.pump.clone()) {
        Ok(handle) => {
            info!("WebSocket connection {} attached", handle.id());
            handle.closed().await;
        }
        Err(e) => error!("Failed to attach WebSocket connection: {}", e),
    }
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close => Message::Close(None),
    }
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data.to_vec()),
        Message::Ping(data) => Frame::Ping(data.to_vec()),
        Message::Pong(data) => Frame::Pong(data.to_vec()),
        Message::Close(_) => Frame::Close,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_map_to_messages() {
        assert!(matches!(
            into_message(Frame::Text("{}".to_string())),
            Message::Text(t) if t.as_str() == "{}"
        ));
        assert!(matches!(into_message(Frame::Close), Message::Close(None)));
        assert_eq!(from_message(Message::Pong(vec![1u8].into())), Frame::Pong(vec![1]));
        assert_eq!(from_message(Message::Close(None)), Frame::Close);
    }
}
