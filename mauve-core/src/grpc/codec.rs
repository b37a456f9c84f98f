//! # JSON <-> Protobuf Codec
//!
//! A `tonic::codec::Codec` bound to one gRPC method. Request values are checked against the
//! method's input descriptor before they are written as Protobuf bytes, and reply bytes are
//! read with the output descriptor and handed back as `serde_json::Value`s. Every error
//! status names the method it came from.
use prost::{Message, bytes::Buf};
use prost_reflect::{DynamicMessage, MessageDescriptor, MethodDescriptor};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// Transcodes the input and output messages of one gRPC method.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    input: Transcoder,
    output: Transcoder,
}

impl JsonCodec {
    /// A client side codec for `method`.
    pub fn for_method(method: &MethodDescriptor) -> Self {
        let transcoder = |descriptor| Transcoder {
            method: method.full_name().to_string(),
            descriptor,
        };

        Self {
            input: transcoder(method.input()),
            output: transcoder(method.output()),
        }
    }

    /// The fully qualified name of the method this codec is bound to.
    pub fn method(&self) -> &str {
        &self.input.method
    }
}

impl Codec for JsonCodec {
    type Encode = serde_json::Value;
    type Decode = serde_json::Value;

    type Encoder = JsonEncoder;
    type Decoder = JsonDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder(self.input.clone())
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder(self.output.clone())
    }
}

/// A message descriptor plus the method it is used for.
#[derive(Debug, Clone)]
struct Transcoder {
    method: String,
    descriptor: MessageDescriptor,
}

impl Transcoder {
    fn to_protobuf(&self, value: serde_json::Value) -> Result<DynamicMessage, Status> {
        DynamicMessage::deserialize(self.descriptor.clone(), value).map_err(|e| {
            Status::invalid_argument(format!(
                "Request body for '{}' does not match '{}': {e}",
                self.method,
                self.descriptor.full_name()
            ))
        })
    }

    fn to_json(&self, bytes: impl Buf) -> Result<serde_json::Value, Status> {
        let message = DynamicMessage::decode(self.descriptor.clone(), bytes).map_err(|e| {
            Status::internal(format!(
                "Reply from '{}' is not a valid '{}': {e}",
                self.method,
                self.descriptor.full_name()
            ))
        })?;

        serde_json::to_value(&message).map_err(|e| {
            Status::internal(format!(
                "Reply from '{}' cannot be represented as JSON: {e}",
                self.method
            ))
        })
    }
}

/// Validates a JSON value against the method input and writes it as Protobuf bytes.
#[derive(Debug)]
pub struct JsonEncoder(Transcoder);

impl Encoder for JsonEncoder {
    type Item = serde_json::Value;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        self.0.to_protobuf(item)?.encode_raw(dst);
        Ok(())
    }
}

/// Reads Protobuf bytes as the method output and turns them into a JSON value.
#[derive(Debug)]
pub struct JsonDecoder(Transcoder);

impl Decoder for JsonDecoder {
    type Item = serde_json::Value;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        self.0.to_json(src).map(Some)
    }
}
