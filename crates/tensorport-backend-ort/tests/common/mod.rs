#![allow(dead_code)]

//! ONNX test graphs built in memory from the subset of `onnx.proto` they need.

use std::io::Write;

use prost::Message;
use tempfile::NamedTempFile;

const FLOAT: i32 = 1;
const IR_VERSION: i64 = 8;
const OPSET: i64 = 13;

#[derive(Clone, PartialEq, Message)]
pub struct ModelProto {
    #[prost(int64, tag = "1")]
    pub ir_version: i64,
    #[prost(message, optional, tag = "7")]
    pub graph: Option<GraphProto>,
    #[prost(message, repeated, tag = "8")]
    pub opset_import: Vec<OperatorSetIdProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OperatorSetIdProto {
    #[prost(string, tag = "1")]
    pub domain: String,
    #[prost(int64, tag = "2")]
    pub version: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct GraphProto {
    #[prost(message, repeated, tag = "1")]
    pub node: Vec<NodeProto>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, repeated, tag = "11")]
    pub input: Vec<ValueInfoProto>,
    #[prost(message, repeated, tag = "12")]
    pub output: Vec<ValueInfoProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NodeProto {
    #[prost(string, repeated, tag = "1")]
    pub input: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub output: Vec<String>,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub op_type: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValueInfoProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub r#type: Option<TypeProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TypeProto {
    #[prost(oneof = "type_proto::Value", tags = "1")]
    pub value: Option<type_proto::Value>,
}

pub mod type_proto {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "1")]
        TensorType(TensorType),
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct TensorType {
        #[prost(int32, tag = "1")]
        pub elem_type: i32,
        #[prost(message, optional, tag = "2")]
        pub shape: Option<super::TensorShapeProto>,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct TensorShapeProto {
    #[prost(message, repeated, tag = "1")]
    pub dim: Vec<tensor_shape_proto::Dimension>,
}

pub mod tensor_shape_proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Dimension {
        #[prost(oneof = "dimension::Value", tags = "1, 2")]
        pub value: Option<dimension::Value>,
    }

    pub mod dimension {
        #[derive(Clone, PartialEq, prost::Oneof)]
        pub enum Value {
            #[prost(int64, tag = "1")]
            DimValue(i64),
            #[prost(string, tag = "2")]
            DimParam(String),
        }
    }
}

/// An f32 tensor slot; `None` axes become symbolic.
fn value_info(name: &str, dims: &[Option<i64>]) -> ValueInfoProto {
    use tensor_shape_proto::{dimension, Dimension};

    let dim = dims
        .iter()
        .enumerate()
        .map(|(i, d)| Dimension {
            value: Some(match d {
                Some(n) => dimension::Value::DimValue(*n),
                None => dimension::Value::DimParam(format!("d{i}")),
            }),
        })
        .collect();

    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::TensorType {
                elem_type: FLOAT,
                shape: Some(TensorShapeProto { dim }),
            })),
        }),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub struct Node<'a> {
    pub op: &'a str,
    pub inputs: &'a [&'a str],
    pub outputs: &'a [&'a str],
}

pub struct Slot<'a> {
    pub name: &'a str,
    pub dims: &'a [Option<i64>],
}

pub fn model(nodes: &[Node<'_>], inputs: &[Slot<'_>], outputs: &[Slot<'_>]) -> Vec<u8> {
    let graph = GraphProto {
        node: nodes
            .iter()
            .enumerate()
            .map(|(i, node)| NodeProto {
                input: strings(node.inputs),
                output: strings(node.outputs),
                name: format!("node{i}"),
                op_type: node.op.to_string(),
            })
            .collect(),
        name: "test-graph".to_string(),
        input: inputs.iter().map(|s| value_info(s.name, s.dims)).collect(),
        output: outputs.iter().map(|s| value_info(s.name, s.dims)).collect(),
    };

    ModelProto {
        ir_version: IR_VERSION,
        graph: Some(graph),
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: OPSET,
        }],
    }
    .encode_to_vec()
}

/// `y = Identity(x)` over `dims`.
pub fn identity(dims: &[Option<i64>]) -> Vec<u8> {
    model(
        &[Node {
            op: "Identity",
            inputs: &["x"],
            outputs: &["y"],
        }],
        &[Slot { name: "x", dims }],
        &[Slot { name: "y", dims }],
    )
}

/// `sum = a + b`, `diff = a - b`, all over `dims`.
pub fn sum_diff(dims: &[Option<i64>]) -> Vec<u8> {
    model(
        &[
            Node {
                op: "Add",
                inputs: &["a", "b"],
                outputs: &["sum"],
            },
            Node {
                op: "Sub",
                inputs: &["a", "b"],
                outputs: &["diff"],
            },
        ],
        &[Slot { name: "a", dims }, Slot { name: "b", dims }],
        &[Slot { name: "sum", dims }, Slot { name: "diff", dims }],
    )
}

pub fn write_model(bytes: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".onnx")
        .tempfile()
        .expect("create model file");
    file.write_all(bytes).expect("write model file");
    file.flush().expect("flush model file");
    file
}
