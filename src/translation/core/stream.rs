//! 流式响应解码
//!
//! 服务端以 SSE 风格的文本行返回增量结果，每行形如
//! `data: {"choices":[{"delta":{"content":"..."}}]}`，以 `data: [DONE]` 结束。
//! 无法解析的行直接跳过。

use futures::stream::LocalBoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::translation::error::TranslationResult;

/// 响应体字节流
pub type ByteStream = LocalBoxStream<'static, TranslationResult<Vec<u8>>>;

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Default, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// 流的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Completed,
    Cancelled,
}

/// 解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedStream {
    pub text: String,
    pub status: StreamStatus,
}

impl DecodedStream {
    pub fn is_cancelled(&self) -> bool {
        self.status == StreamStatus::Cancelled
    }
}

/// 增量行解码器
///
/// 未结束的行以字节形式缓存，多字节字符跨块切分也能正确拼接。
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    text: String,
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个数据块，每追加一段内容调用一次 `on_update`（参数为累计文本）
    pub fn feed<F>(&mut self, bytes: &[u8], on_update: &mut F)
    where
        F: FnMut(&str),
    {
        if self.done {
            return;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.handle_line(&line, on_update);
            if self.done {
                self.buffer.clear();
                return;
            }
        }
    }

    /// 处理缓冲区中剩余的最后一行
    pub fn finish<F>(&mut self, on_update: &mut F)
    where
        F: FnMut(&str),
    {
        if self.done || self.buffer.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.buffer);
        self.handle_line(&line, on_update);
    }

    fn handle_line<F>(&mut self, raw: &[u8], on_update: &mut F)
    where
        F: FnMut(&str),
    {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let payload = line.strip_prefix(DATA_PREFIX).unwrap_or(line).trim();
        if payload == DONE_MARKER {
            self.done = true;
            return;
        }

        let chunk: Chunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!("跳过无法解析的数据行: {} ({})", payload, e);
                return;
            }
        };

        let content = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .unwrap_or_default();
        if !content.is_empty() {
            self.text.push_str(&content);
            on_update(&self.text);
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 是否已读到结束标记
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// 读取整个响应流；取消时返回已收到的部分并标记为取消
pub async fn decode_stream<F>(
    mut stream: ByteStream,
    cancel: &CancellationToken,
    mut on_update: F,
) -> TranslationResult<DecodedStream>
where
    F: FnMut(&str),
{
    let mut decoder = StreamDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(DecodedStream {
                    text: decoder.into_text(),
                    status: StreamStatus::Cancelled,
                });
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                decoder.feed(&bytes, &mut on_update);
                if decoder.is_done() {
                    break;
                }
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    decoder.finish(&mut on_update);
    Ok(DecodedStream {
        text: decoder.into_text(),
        status: StreamStatus::Completed,
    })
}
