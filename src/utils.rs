#![allow(unused)]

pub(crate) struct BitIter(pub(crate) u32);

impl Iterator for BitIter {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        match self.0.trailing_zeros() {
            32 => None,
            b => {
                self.0 &= !(1 << b);
                Some(b as _)
            }
        }
    }
}
