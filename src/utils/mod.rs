mod id_gen;

pub use id_gen::{IdGenerator, NameGenerator};

#[cfg(test)]
#[allow(dead_code)]
pub fn diff(a: &str, b: &str) -> String {
    use similar_asserts::SimpleDiff;
    SimpleDiff::from_str(a, b, "left", "right").to_string()
}
