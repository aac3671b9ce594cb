/// Implements the standard arithmetic traits for single-field tuple structs.
///
/// `binary` covers `Self op Self` traits such as `Add` and `Sub`, `inplace` covers the assigning
/// variants.
#[macro_export]
macro_rules! op {
    (binary $t:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $t:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            fn $method(&mut self, rhs: Self) {
                std::ops::$trait::$method(&mut self.0, rhs.0);
            }
        }
    };
}
