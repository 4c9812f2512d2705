//! Boolean expression over term bits.

use crate::index::TermMask;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// `left AND NOT right`
    AndNot(Box<Expr>, Box<Expr>),
    /// Leaf referencing a term bit
    Value(u8),
}

impl Expr {
    pub fn and(left: Expr, right: Expr) -> Expr {
        match (left, right) {
            (left, Expr::Not(inner)) => Expr::and_not(left, *inner),
            (Expr::Not(inner), right) => Expr::and_not(right, *inner),
            (left, right) => Expr::And(Box::new(left), Box::new(right)),
        }
    }

    pub fn and_not(left: Expr, right: Expr) -> Expr {
        match right {
            Expr::Not(inner) => Expr::and(left, *inner),
            right => Expr::AndNot(Box::new(left), Box::new(right)),
        }
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::Or(Box::new(left), Box::new(right))
    }

    pub fn not(inner: Expr) -> Expr {
        match inner {
            Expr::Not(inner) => *inner,
            inner => Expr::Not(Box::new(inner)),
        }
    }

    /// Evaluate against the term bits of one entry
    pub fn eval(&self, bits: TermMask) -> bool {
        match self {
            Expr::And(l, r) => l.eval(bits) && r.eval(bits),
            Expr::Or(l, r) => l.eval(bits) || r.eval(bits),
            Expr::Not(e) => !e.eval(bits),
            Expr::AndNot(l, r) => l.eval(bits) && !r.eval(bits),
            Expr::Value(bit) => bits.contains(*bit),
        }
    }

    /// Bits referenced by the leaves
    pub fn terms(&self) -> TermMask {
        let mut mask = TermMask::EMPTY;
        self.collect(&mut mask);
        mask
    }

    fn collect(&self, mask: &mut TermMask) {
        match self {
            Expr::And(l, r) | Expr::Or(l, r) | Expr::AndNot(l, r) => {
                l.collect(mask);
                r.collect(mask);
            }
            Expr::Not(e) => e.collect(mask),
            Expr::Value(bit) => mask.insert(*bit),
        }
    }

    /// Replace every leaf `i` with `bits[i]`
    pub(crate) fn remap(self, bits: &[u8]) -> Expr {
        match self {
            Expr::And(l, r) => Expr::And(Box::new(l.remap(bits)), Box::new(r.remap(bits))),
            Expr::Or(l, r) => Expr::Or(Box::new(l.remap(bits)), Box::new(r.remap(bits))),
            Expr::AndNot(l, r) => Expr::AndNot(Box::new(l.remap(bits)), Box::new(r.remap(bits))),
            Expr::Not(e) => Expr::Not(Box::new(e.remap(bits))),
            Expr::Value(i) => Expr::Value(bits[i as usize]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(bit: u8) -> Expr {
        Expr::Value(bit)
    }

    fn mask(bits: &[u8]) -> TermMask {
        let mut m = TermMask::EMPTY;
        for &b in bits {
            m.insert(b);
        }
        m
    }

    #[test]
    fn test_folding() {
        assert_eq!(Expr::and(v(0), Expr::not(v(1))), Expr::AndNot(Box::new(v(0)), Box::new(v(1))));
        assert_eq!(Expr::and(Expr::not(v(0)), v(1)), Expr::AndNot(Box::new(v(1)), Box::new(v(0))));
        assert_eq!(Expr::not(Expr::not(v(3))), v(3));
        assert_eq!(Expr::and_not(v(0), Expr::not(v(1))), Expr::and(v(0), v(1)));
    }

    #[test]
    fn test_eval() {
        let e = Expr::or(Expr::and_not(v(0), v(1)), v(2));
        assert!(e.eval(mask(&[0])));
        assert!(!e.eval(mask(&[0, 1])));
        assert!(e.eval(mask(&[0, 1, 2])));
        assert!(!e.eval(mask(&[])));
        assert_eq!(e.terms(), mask(&[0, 1, 2]));
    }

    #[test]
    fn test_remap() {
        let e = Expr::and(v(0), Expr::not(v(1))).remap(&[7, 4]);
        assert_eq!(e, Expr::AndNot(Box::new(v(7)), Box::new(v(4))));
    }
}
