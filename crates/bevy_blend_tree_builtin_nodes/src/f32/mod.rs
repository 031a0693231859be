pub mod const_f32;
