//! Earth Engine expression graphs
//!
//! The REST API takes a computation as `{"result": key, "values": {key: value}}`
//! where each value is a constant, a function invocation, an argument reference or a
//! function definition whose body points to another entry of `values`. Nodes are
//! built as a tree and flattened into that table by [`Node::to_expression`].

use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::commons::basic_functions::DateRange;
use crate::geo_core::Roi;

/// Argument name used for mapped functions
const MAPPING_VAR: &str = "_MAPPING_VAR_0_0";

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Constant(Value),
    Call { function: String, args: Vec<(String, Node)> },
    Argument(String),
    Function { params: Vec<String>, body: Box<Node> },
}

impl Node {
    pub fn constant(value: impl Into<Value>) -> Self {
        Node::Constant(value.into())
    }

    pub fn call(function: &str, args: Vec<(&str, Node)>) -> Self {
        Node::Call {
            function: function.to_string(),
            args: args
                .into_iter()
                .map(|(name, node)| (name.to_string(), node))
                .collect(),
        }
    }

    /// Serialize into the REST `Expression` object
    pub fn to_expression(&self) -> Value {
        let mut values = Map::new();
        let root = self.encode(&mut values);
        let key = values.len().to_string();
        values.insert(key.clone(), root);
        json!({ "result": key, "values": values })
    }

    fn encode(&self, values: &mut Map<String, Value>) -> Value {
        match self {
            Node::Constant(value) => json!({ "constantValue": value }),
            Node::Argument(name) => json!({ "argumentReference": name }),
            Node::Call { function, args } => {
                let mut arguments = Map::new();
                for (name, node) in args {
                    arguments.insert(name.clone(), node.encode(values));
                }
                json!({
                    "functionInvocationValue": {
                        "functionName": function,
                        "arguments": arguments,
                    }
                })
            }
            Node::Function { params, body } => {
                let encoded = body.encode(values);
                let key = values.len().to_string();
                values.insert(key.clone(), encoded);
                json!({
                    "functionDefinitionValue": {
                        "argumentNames": params,
                        "body": key,
                    }
                })
            }
        }
    }
}

/// `ee.Geometry.MultiPolygon` of the region's boundary
pub fn geometry(roi: &Roi) -> Node {
    let coordinates = match roi.to_geojson().value {
        geojson::Value::MultiPolygon(coords) => json!(coords),
        other => json!(other),
    };
    Node::call(
        "GeometryConstructors.MultiPolygon",
        vec![
            ("coordinates", Node::constant(coordinates)),
            ("geodesic", Node::constant(false)),
        ],
    )
}

fn date(day: NaiveDate) -> Node {
    Node::call(
        "Date",
        vec![("value", Node::constant(day.format("%Y-%m-%d").to_string()))],
    )
}

/// `ee.ImageCollection(id).filterBounds(roi).filterDate(start, end + 1 day)`
pub fn filtered_collection(dataset_id: &str, roi: &Roi, range: &DateRange) -> Node {
    let collection = Node::call("ImageCollection.load", vec![("id", Node::constant(dataset_id))]);

    let bounded = Node::call(
        "Collection.filter",
        vec![
            ("collection", collection),
            (
                "filter",
                Node::call(
                    "Filter.intersects",
                    vec![
                        ("leftField", Node::constant(".all")),
                        (
                            "rightValue",
                            Node::call("Feature", vec![("geometry", geometry(roi))]),
                        ),
                    ],
                ),
            ),
        ],
    );

    Node::call(
        "Collection.filter",
        vec![
            ("collection", bounded),
            (
                "filter",
                Node::call(
                    "Filter.dateRangeContains",
                    vec![
                        (
                            "leftValue",
                            Node::call(
                                "DateRange",
                                vec![
                                    ("start", date(range.start())),
                                    ("end", date(range.end_exclusive())),
                                ],
                            ),
                        ),
                        ("rightField", Node::constant("system:time_start")),
                    ],
                ),
            ),
        ],
    )
}

/// `collection.map(img => img.select(bands, names))`
pub fn select_bands(collection: Node, bands: &[&str], names: &[&str]) -> Node {
    let body = Node::call(
        "Image.select",
        vec![
            ("input", Node::Argument(MAPPING_VAR.to_string())),
            ("bandSelectors", Node::constant(json!(bands))),
            ("newNames", Node::constant(json!(names))),
        ],
    );
    Node::call(
        "Collection.map",
        vec![
            ("collection", collection),
            (
                "baseAlgorithm",
                Node::Function {
                    params: vec![MAPPING_VAR.to_string()],
                    body: Box::new(body),
                },
            ),
        ],
    )
}

pub fn median(collection: Node) -> Node {
    Node::call("reduce.median", vec![("collection", collection)])
}

/// `image.normalizedDifference([first, second]).rename(output)`
pub fn normalized_difference(image: Node, first: &str, second: &str, output: &str) -> Node {
    let nd = Node::call(
        "Image.normalizedDifference",
        vec![
            ("input", image),
            ("bandNames", Node::constant(json!([first, second]))),
        ],
    );
    Node::call(
        "Image.rename",
        vec![("input", nd), ("names", Node::constant(json!([output])))],
    )
}

/// Float32 image clipped to the region, ready for export
pub fn export_image(image: Node, roi: &Roi) -> Node {
    let clipped = Node::call(
        "Image.clip",
        vec![("input", image), ("geometry", geometry(roi))],
    );
    Node::call("Image.toFloat", vec![("value", clipped)])
}
