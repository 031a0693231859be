use crate::edge_data::DataSpec;

/// Ports declared by a node, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSpec {
    pub inputs: Vec<(String, DataSpec)>,
    pub outputs: Vec<(String, DataSpec)>,
}

pub struct SpecContext<'a> {
    spec: &'a mut NodeSpec,
}

impl<'a> SpecContext<'a> {
    pub fn new(spec: &'a mut NodeSpec) -> Self {
        Self { spec }
    }

    pub fn add_input_data(&mut self, name: impl Into<String>, spec: DataSpec) -> &mut Self {
        self.spec.inputs.push((name.into(), spec));
        self
    }

    pub fn add_input_pose(&mut self, name: impl Into<String>) -> &mut Self {
        self.add_input_data(name, DataSpec::Pose)
    }

    pub fn add_output_data(&mut self, name: impl Into<String>, spec: DataSpec) -> &mut Self {
        self.spec.outputs.push((name.into(), spec));
        self
    }

    pub fn add_output_pose(&mut self, name: impl Into<String>) -> &mut Self {
        self.add_output_data(name, DataSpec::Pose)
    }
}
