//! Scalar arithmetic kernels.
//!
//! Every kernel either produces a number or reports exactly one diagnostic.
//! Under runtime semantics the diagnostic is a warning and a substitute value
//! is returned so evaluation can carry on; otherwise it is an error and the
//! kernel fails.

use super::number::{Float, Number};
use super::{Eval, Failure};
use crate::Span;

pub type KernelResult<T> = Result<T, Failure>;

const DIVISION_BY_ZERO: &str = "integer division by zero is invalid";

impl Eval<'_> {
    /// Report `message`, then fail or carry on with `substitute`.
    pub(super) fn recover<T>(&mut self, message: String, span: Span, substitute: T) -> KernelResult<T> {
        if self.use_runtime_semantics {
            log::debug!("continuing after: {}", message);
            self.diagnostics.add_warning(message, span);
            Ok(substitute)
        } else {
            self.diagnostics.add_error(message, span);
            Err(Failure)
        }
    }

    fn overflow<N: Number>(&mut self, a: N, op: &str, b: N, span: Span, substitute: N) -> KernelResult<N> {
        let message = format!(
            "'{} {} {}' cannot be represented as '{}'",
            a.display(),
            op,
            b.display(),
            N::SCALAR
        );
        self.recover(message, span, substitute)
    }

    pub fn add<N: Number>(&mut self, span: Span, a: N, b: N) -> KernelResult<N> {
        if N::wraps() {
            return Ok(a.wrapping_add(b));
        }
        match a.checked_add(b) {
            Some(result) => Ok(result),
            None => self.overflow(a, "+", b, span, N::ZERO),
        }
    }

    pub fn sub<N: Number>(&mut self, span: Span, a: N, b: N) -> KernelResult<N> {
        if N::wraps() {
            return Ok(a.wrapping_sub(b));
        }
        match a.checked_sub(b) {
            Some(result) => Ok(result),
            None => self.overflow(a, "-", b, span, N::ZERO),
        }
    }

    pub fn mul<N: Number>(&mut self, span: Span, a: N, b: N) -> KernelResult<N> {
        if N::wraps() {
            return Ok(a.wrapping_mul(b));
        }
        match a.checked_mul(b) {
            Some(result) => Ok(result),
            None => self.overflow(a, "*", b, span, N::ZERO),
        }
    }

    /// Division. Integer failures substitute `a`, float failures zero.
    pub fn div<N: Number>(&mut self, span: Span, a: N, b: N) -> KernelResult<N> {
        if N::SCALAR.is_integer() {
            if b == N::ZERO {
                return self.recover(DIVISION_BY_ZERO.to_string(), span, a);
            }
            match a.checked_div(b) {
                Some(result) => Ok(result),
                // the most negative value divided by -1
                None => self.overflow(a, "/", b, span, a),
            }
        } else {
            match a.checked_div(b) {
                Some(result) => Ok(result),
                None => self.overflow(a, "/", b, span, N::ZERO),
            }
        }
    }

    /// Truncated remainder. Failures substitute zero.
    pub fn rem<N: Number>(&mut self, span: Span, a: N, b: N) -> KernelResult<N> {
        if N::SCALAR.is_integer() && b == N::ZERO {
            return self.recover(DIVISION_BY_ZERO.to_string(), span, N::ZERO);
        }
        match a.checked_rem(b) {
            Some(result) => Ok(result),
            None => self.overflow(a, "%", b, span, N::ZERO),
        }
    }

    pub fn dot2<N: Number>(&mut self, span: Span, a1: N, a2: N, b1: N, b2: N) -> KernelResult<N> {
        let r1 = self.mul(span, a1, b1)?;
        let r2 = self.mul(span, a2, b2)?;
        self.add(span, r1, r2)
    }

    pub fn dot3<N: Number>(
        &mut self,
        span: Span,
        a1: N,
        a2: N,
        a3: N,
        b1: N,
        b2: N,
        b3: N,
    ) -> KernelResult<N> {
        let r1 = self.mul(span, a1, b1)?;
        let r2 = self.mul(span, a2, b2)?;
        let r3 = self.mul(span, a3, b3)?;
        let sum = self.add(span, r1, r2)?;
        self.add(span, sum, r3)
    }

    pub fn dot4<N: Number>(
        &mut self,
        span: Span,
        a1: N,
        a2: N,
        a3: N,
        a4: N,
        b1: N,
        b2: N,
        b3: N,
        b4: N,
    ) -> KernelResult<N> {
        let r1 = self.mul(span, a1, b1)?;
        let r2 = self.mul(span, a2, b2)?;
        let r3 = self.mul(span, a3, b3)?;
        let r4 = self.mul(span, a4, b4)?;
        let sum = self.add(span, r1, r2)?;
        let sum = self.add(span, sum, r3)?;
        self.add(span, sum, r4)
    }

    /// Dot product of two vectors of 2, 3 or 4 elements.
    pub fn dot<N: Number>(&mut self, span: Span, a: &[N], b: &[N]) -> KernelResult<N> {
        assert_eq!(a.len(), b.len(), "dot product of mismatched vectors");
        match *a {
            [a1, a2] => self.dot2(span, a1, a2, b[0], b[1]),
            [a1, a2, a3] => self.dot3(span, a1, a2, a3, b[0], b[1], b[2]),
            [a1, a2, a3, a4] => self.dot4(span, a1, a2, a3, a4, b[0], b[1], b[2], b[3]),
            _ => unreachable!("dot product of {} elements", a.len()),
        }
    }

    /// Determinant of the 2x2 matrix with columns `(a, b)` and `(c, d)`.
    pub fn det2<N: Number>(&mut self, span: Span, a: N, b: N, c: N, d: N) -> KernelResult<N> {
        let ad = self.mul(span, a, d)?;
        let bc = self.mul(span, b, c)?;
        self.sub(span, ad, bc)
    }

    /// Determinant of the 3x3 matrix with columns `(a, b, c)`, `(d, e, f)`
    /// and `(g, h, i)`.
    pub fn det3<N: Number>(
        &mut self,
        span: Span,
        a: N,
        b: N,
        c: N,
        d: N,
        e: N,
        f: N,
        g: N,
        h: N,
        i: N,
    ) -> KernelResult<N> {
        let m1 = self.det2(span, e, f, h, i)?;
        let m2 = self.det2(span, b, c, h, i)?;
        let m3 = self.det2(span, b, c, e, f)?;
        let r1 = self.mul(span, a, m1)?;
        let r2 = self.mul(span, d, m2)?;
        let r3 = self.mul(span, g, m3)?;
        let diff = self.sub(span, r1, r2)?;
        self.add(span, diff, r3)
    }

    /// Determinant of the 4x4 matrix with columns `(a, b, c, d)`,
    /// `(e, f, g, h)`, `(i, j, k, l)` and `(m, n, o, p)`.
    pub fn det4<N: Number>(&mut self, span: Span, columns: [[N; 4]; 4]) -> KernelResult<N> {
        let [[a, b, c, d], [e, f, g, h], [i, j, k, l], [m, n, o, p]] = columns;
        let m1 = self.det3(span, f, g, h, j, k, l, n, o, p)?;
        let m2 = self.det3(span, b, c, d, j, k, l, n, o, p)?;
        let m3 = self.det3(span, b, c, d, f, g, h, n, o, p)?;
        let m4 = self.det3(span, b, c, d, f, g, h, j, k, l)?;
        let r1 = self.mul(span, a, m1)?;
        let r2 = self.mul(span, e, m2)?;
        let r3 = self.mul(span, i, m3)?;
        let r4 = self.mul(span, m, m4)?;
        let diff = self.sub(span, r1, r2)?;
        let sum = self.add(span, diff, r3)?;
        self.sub(span, sum, r4)
    }

    /// `min(max(e, low), high)`.
    pub fn clamp<N: Number>(&mut self, _span: Span, e: N, low: N, high: N) -> KernelResult<N> {
        Ok(e.max(low).min(high))
    }

    pub fn sqrt<F: Float>(&mut self, span: Span, v: F) -> KernelResult<F> {
        if v < F::ZERO {
            return self.recover(
                "sqrt must be called with a value >= 0".to_string(),
                span,
                F::ZERO,
            );
        }
        Ok(v.sqrt())
    }
}
