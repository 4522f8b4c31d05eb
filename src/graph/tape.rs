//! Wengert-list tape with eager forward evaluation.

/// Handle to a node on a [`Tape`]. Cheap to copy; only meaningful for the
/// tape that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value(pub(crate) usize);

impl Value {
    pub(crate) fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Leaf,
    Add(usize, usize),
    Sub(usize, usize),
    Mul(usize, usize),
    Div(usize, usize),
    AddConst(usize, f64),
    Scale(usize, f64),
    Exp(usize),
    Ln(usize),
    Logistic(usize),
    Tanh(usize),
    Square(usize),
}

#[derive(Debug, Clone, Copy)]
struct Node {
    op: Op,
    value: f64,
}

/// One computation graph. Built fresh per series, discarded after the
/// backward sweep.
#[derive(Debug, Default)]
pub struct Tape {
    nodes: Vec<Node>,
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, op: Op, value: f64) -> Value {
        self.nodes.push(Node { op, value });
        Value(self.nodes.len() - 1)
    }

    /// Wrap a number as a graph input.
    pub fn leaf(&mut self, x: f64) -> Value {
        self.push(Op::Leaf, x)
    }

    /// Forward value of a node.
    pub fn value(&self, v: Value) -> f64 {
        self.nodes[v.0].value
    }

    pub fn add(&mut self, a: Value, b: Value) -> Value {
        let val = self.value(a) + self.value(b);
        self.push(Op::Add(a.0, b.0), val)
    }

    pub fn sub(&mut self, a: Value, b: Value) -> Value {
        let val = self.value(a) - self.value(b);
        self.push(Op::Sub(a.0, b.0), val)
    }

    pub fn mul(&mut self, a: Value, b: Value) -> Value {
        let val = self.value(a) * self.value(b);
        self.push(Op::Mul(a.0, b.0), val)
    }

    pub fn div(&mut self, a: Value, b: Value) -> Value {
        let val = self.value(a) / self.value(b);
        self.push(Op::Div(a.0, b.0), val)
    }

    pub fn add_const(&mut self, a: Value, c: f64) -> Value {
        let val = self.value(a) + c;
        self.push(Op::AddConst(a.0, c), val)
    }

    pub fn scale(&mut self, a: Value, c: f64) -> Value {
        let val = self.value(a) * c;
        self.push(Op::Scale(a.0, c), val)
    }

    /// `1 - a`, used by the smoothing recurrences.
    pub fn one_minus(&mut self, a: Value) -> Value {
        let neg = self.scale(a, -1.0);
        self.add_const(neg, 1.0)
    }

    pub fn exp(&mut self, a: Value) -> Value {
        let val = self.value(a).exp();
        self.push(Op::Exp(a.0), val)
    }

    pub fn ln(&mut self, a: Value) -> Value {
        let val = self.value(a).ln();
        self.push(Op::Ln(a.0), val)
    }

    pub fn logistic(&mut self, a: Value) -> Value {
        let val = 1.0 / (1.0 + (-self.value(a)).exp());
        self.push(Op::Logistic(a.0), val)
    }

    pub fn tanh(&mut self, a: Value) -> Value {
        let val = self.value(a).tanh();
        self.push(Op::Tanh(a.0), val)
    }

    pub fn square(&mut self, a: Value) -> Value {
        let x = self.value(a);
        self.push(Op::Square(a.0), x * x)
    }

    /// Sum of a non-empty slice of values.
    pub fn sum(&mut self, vs: &[Value]) -> Value {
        let mut acc = vs[0];
        for v in &vs[1..] {
            acc = self.add(acc, *v);
        }
        acc
    }

    /// Arithmetic mean of a non-empty slice of values.
    pub fn average(&mut self, vs: &[Value]) -> Value {
        let total = self.sum(vs);
        self.scale(total, 1.0 / vs.len() as f64)
    }

    /// Reverse sweep from `loss`. Returns the gradient of `loss` with
    /// respect to every node, indexed by node position.
    pub fn backward(&self, loss: Value) -> Vec<f64> {
        let mut grads = vec![0.0; self.nodes.len()];
        grads[loss.0] = 1.0;
        for idx in (0..=loss.0).rev() {
            let g = grads[idx];
            if g == 0.0 {
                continue;
            }
            let node = &self.nodes[idx];
            match node.op {
                Op::Leaf => {}
                Op::Add(a, b) => {
                    grads[a] += g;
                    grads[b] += g;
                }
                Op::Sub(a, b) => {
                    grads[a] += g;
                    grads[b] -= g;
                }
                Op::Mul(a, b) => {
                    grads[a] += g * self.nodes[b].value;
                    grads[b] += g * self.nodes[a].value;
                }
                Op::Div(a, b) => {
                    let bv = self.nodes[b].value;
                    grads[a] += g / bv;
                    grads[b] -= g * self.nodes[a].value / (bv * bv);
                }
                Op::AddConst(a, _) => grads[a] += g,
                Op::Scale(a, c) => grads[a] += g * c,
                Op::Exp(a) => grads[a] += g * node.value,
                Op::Ln(a) => grads[a] += g / self.nodes[a].value,
                Op::Logistic(a) => grads[a] += g * node.value * (1.0 - node.value),
                Op::Tanh(a) => grads[a] += g * (1.0 - node.value * node.value),
                Op::Square(a) => grads[a] += g * 2.0 * self.nodes[a].value,
            }
        }
        grads
    }
}
