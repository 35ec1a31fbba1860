//! COA workflow edges

use serde::{Deserialize, Serialize};

/// Edge semantics, tagged by `type` in scenario files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeKind {
    /// Plain precedence
    Flow,

    /// Precedence annotated with a branch weight in [0, 1]
    ///
    /// The weight is carried for tooling; it does not gate traversal.
    FlowWithProbability { probability: f64 },

    /// Target becomes eligible once every listed flow reached an executed
    /// node
    ExceptionJoin { flows: Vec<String> },
}

/// Edge between two nodes, by ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoaEdge {
    pub from: String,
    pub to: String,
    /// Branch this edge belongs to, referenced by exception joins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
    #[serde(flatten)]
    pub kind: EdgeKind,
}

impl CoaEdge {
    pub fn flow(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            flow_id: None,
            kind: EdgeKind::Flow,
        }
    }

    pub fn with_probability(from: impl Into<String>, to: impl Into<String>, probability: f64) -> Self {
        Self {
            kind: EdgeKind::FlowWithProbability { probability },
            ..Self::flow(from, to)
        }
    }

    pub fn exception_join<I, S>(from: impl Into<String>, to: impl Into<String>, flows: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: EdgeKind::ExceptionJoin {
                flows: flows.into_iter().map(Into::into).collect(),
            },
            ..Self::flow(from, to)
        }
    }

    /// Tag the edge as part of a named flow
    pub fn on_flow(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }

    pub fn is_exception_join(&self) -> bool {
        matches!(self.kind, EdgeKind::ExceptionJoin { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edge_kinds_parse() {
        let edges: Vec<CoaEdge> = serde_json::from_value(json!([
            { "from": "a", "to": "b", "type": "flow", "flow_id": "left" },
            { "from": "a", "to": "c", "type": "flow_with_probability", "probability": 0.25 },
            { "from": "b", "to": "d", "type": "exception_join", "flows": ["left", "right"] }
        ]))
        .unwrap();

        assert_eq!(edges[0], CoaEdge::flow("a", "b").on_flow("left"));
        assert_eq!(edges[1], CoaEdge::with_probability("a", "c", 0.25));
        assert!(edges[2].is_exception_join());
    }
}
