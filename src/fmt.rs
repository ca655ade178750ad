use std::fmt;


/// Renders the wrapped number as `0x`-prefixed hex inside Debug output.
pub struct Hex<'a, N: fmt::LowerHex>(pub &'a N);

impl<'a, N: fmt::LowerHex> fmt::Debug for Hex<'a, N> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}


pub struct Binary<'a, N: fmt::Binary>(pub &'a N);

impl<'a, N: fmt::Binary> fmt::Debug for Binary<'a, N> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        fmt::Binary::fmt(self.0, f)
    }
}
