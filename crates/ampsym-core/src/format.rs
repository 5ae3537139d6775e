use std::collections::HashMap;

use dyn_clone::DynClone;
use num::complex::Complex64;

use crate::expression::{format_number, Expr, Index, IndexRange, Node, NodeKind};

/// A rule which renders one kind of node.
///
/// Formatters receive the [`Printer`] they were registered with so that children can be rendered
/// through [`Printer::render`] and pick up any other registered overrides.
pub trait NodeFormatter: DynClone + Send + Sync {
    /// Render `expr`, whose root is of the kind this formatter was registered for.
    fn format(&self, expr: &Expr, printer: &Printer) -> String;
}

dyn_clone::clone_trait_object!(NodeFormatter);

impl<F> NodeFormatter for F
where
    F: Fn(&Expr, &Printer) -> String + Clone + Send + Sync,
{
    fn format(&self, expr: &Expr, printer: &Printer) -> String {
        self(expr, printer)
    }
}

/// The built-in output styles.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Style {
    /// Plain one-line text.
    Text,
    /// LaTeX math mode.
    Latex,
}

/// Renders expression trees as strings.
///
/// Each [`NodeKind`] can be given its own [`NodeFormatter`]; kinds without one use the built-in
/// rule of the printer's [`Style`]. Registrations belong to one printer only.
#[derive(Clone)]
pub struct Printer {
    style: Style,
    formatters: HashMap<NodeKind, Box<dyn NodeFormatter>>,
}

const GREEK: [&str; 24] = [
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "pi", "rho", "sigma", "tau", "upsilon", "phi", "chi", "psi",
    "omega", "varphi",
];

fn precedence(expr: &Expr) -> u8 {
    match expr.node() {
        Node::Add(_) | Node::PoolSum { .. } => 1,
        Node::Mul(_) => 2,
        Node::Number(literal) if literal.0.re < 0.0 || literal.0.im != 0.0 => 2,
        Node::Pow(_, _) => 3,
        _ => 4,
    }
}

/// Split a leading negative literal factor off a term, for printing `a - b` instead of
/// `a + -1*b`.
fn split_negative(term: &Expr) -> Option<Expr> {
    match term.node() {
        Node::Number(literal) if literal.0.im == 0.0 && literal.0.re < 0.0 => {
            Some(Expr::number(-literal.0))
        }
        Node::Mul(factors) => {
            let c = factors[0].as_number()?;
            if c.im != 0.0 || c.re >= 0.0 {
                return None;
            }
            let mut rest = vec![Expr::number(-c)];
            rest.extend(factors[1..].iter().cloned());
            Some(Expr::product(rest))
        }
        _ => None,
    }
}

fn contiguous_from_zero(values: &[i64]) -> bool {
    !values.is_empty() && values.iter().enumerate().all(|(i, v)| *v == i as i64)
}

impl Printer {
    fn with_style(style: Style) -> Self {
        Self {
            style,
            formatters: HashMap::new(),
        }
    }

    /// A printer for plain one-line text.
    pub fn text() -> Self {
        Self::with_style(Style::Text)
    }

    /// A printer for LaTeX math mode.
    pub fn latex() -> Self {
        Self::with_style(Style::Latex)
    }

    /// The built-in style of the printer.
    pub fn style(&self) -> Style {
        self.style
    }

    /// Use `formatter` for every node of `kind`, replacing any earlier registration.
    pub fn register<F: NodeFormatter + 'static>(&mut self, kind: NodeKind, formatter: F) -> &mut Self {
        self.formatters.insert(kind, Box::new(formatter));
        self
    }

    /// Builder form of [`Printer::register`].
    pub fn with<F: NodeFormatter + 'static>(mut self, kind: NodeKind, formatter: F) -> Self {
        self.register(kind, formatter);
        self
    }

    /// Render a tree.
    pub fn render(&self, expr: &Expr) -> String {
        match self.formatters.get(&expr.kind()) {
            Some(formatter) => formatter.format(expr, self),
            None => self.builtin(expr),
        }
    }

    fn operand(&self, expr: &Expr, min_precedence: u8) -> String {
        let rendered = self.render(expr);
        if precedence(expr) < min_precedence {
            self.parens(&rendered)
        } else {
            rendered
        }
    }

    fn parens(&self, inner: &str) -> String {
        match self.style {
            Style::Text => format!("({inner})"),
            Style::Latex => format!("\\left({inner}\\right)"),
        }
    }

    fn number(&self, value: Complex64) -> String {
        match self.style {
            Style::Text => format_number(value),
            Style::Latex => latex_number(value),
        }
    }

    fn symbol(&self, name: &str) -> String {
        match self.style {
            Style::Latex if GREEK.contains(&name.to_lowercase().as_str()) => format!("\\{name}"),
            _ => name.to_string(),
        }
    }

    fn indices(indices: &[Index]) -> String {
        indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn range(&self, range: &IndexRange) -> String {
        let values = range
            .values()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match self.style {
            Style::Text => format!("{} in {{{}}}", range.name(), values),
            Style::Latex if contiguous_from_zero(range.values()) => format!(
                "\\sum_{{{}=0}}^{{{}}}",
                range.name(),
                range.values().len() - 1
            ),
            Style::Latex => format!("\\sum_{{{} \\in \\{{{}\\}}}}", range.name(), values),
        }
    }

    fn builtin(&self, expr: &Expr) -> String {
        let latex = self.style == Style::Latex;
        match expr.node() {
            Node::Number(literal) => self.number(literal.0),
            Node::Symbol(s) => self.symbol(s.name()),
            Node::Coefficient { family, indices } => {
                if latex {
                    format!(
                        "{}^{{({})}}_{{{}}}",
                        family.name(),
                        family.sign(),
                        Self::indices(indices)
                    )
                } else {
                    format!("{}[{}]", family, Self::indices(indices))
                }
            }
            Node::Add(terms) => {
                let mut out = self.operand(&terms[0], 1);
                for term in &terms[1..] {
                    match split_negative(term) {
                        Some(positive) => {
                            out.push_str(" - ");
                            out.push_str(&self.operand(&positive, 2));
                        }
                        None => {
                            out.push_str(" + ");
                            out.push_str(&self.operand(term, 2));
                        }
                    }
                }
                out
            }
            Node::Mul(factors) => {
                let (prefix, factors) = match factors[0].as_number() {
                    Some(c) if c == -Complex64::ONE => ("-", &factors[1..]),
                    _ => ("", &factors[..]),
                };
                let separator = if latex { " " } else { "*" };
                let body = factors
                    .iter()
                    .map(|f| self.operand(f, 3))
                    .collect::<Vec<_>>()
                    .join(separator);
                format!("{prefix}{body}")
            }
            Node::Pow(base, exponent) => {
                let base_text = match base.node() {
                    Node::Abs(_) => self.render(base),
                    _ => self.operand(base, 4),
                };
                if latex {
                    format!("{}^{{{}}}", base_text, self.render(exponent))
                } else {
                    format!("{}^{}", base_text, self.operand(exponent, 4))
                }
            }
            Node::Abs(a) => {
                if latex {
                    format!("\\left|{}\\right|", self.render(a))
                } else {
                    format!("|{}|", self.render(a))
                }
            }
            Node::Re(a) => {
                if latex {
                    format!("\\operatorname{{Re}}\\left[{}\\right]", self.render(a))
                } else {
                    format!("re({})", self.render(a))
                }
            }
            Node::Im(a) => {
                if latex {
                    format!("\\operatorname{{Im}}\\left[{}\\right]", self.render(a))
                } else {
                    format!("im({})", self.render(a))
                }
            }
            Node::Conj(a) => {
                if latex {
                    format!("\\overline{{{}}}", self.render(a))
                } else {
                    format!("conj({})", self.render(a))
                }
            }
            Node::Exp(a) => {
                if latex {
                    format!("e^{{{}}}", self.render(a))
                } else {
                    format!("exp({})", self.render(a))
                }
            }
            Node::Ylm { l, m, theta, phi } => {
                if latex {
                    format!(
                        "Y_{{{}}}^{{{}}}\\left({}, {}\\right)",
                        l,
                        m,
                        self.render(theta),
                        self.render(phi)
                    )
                } else {
                    format!("Y({}, {}, {}, {})", l, m, self.render(theta), self.render(phi))
                }
            }
            Node::Zlm {
                l,
                m,
                theta,
                phi,
                big_phi,
            } => {
                if latex {
                    format!(
                        "Z_{{{}}}^{{{}}}\\left({}, {}, {}\\right)",
                        l,
                        m,
                        self.render(theta),
                        self.render(phi),
                        self.render(big_phi)
                    )
                } else {
                    format!(
                        "Z({}, {}, {}, {}, {})",
                        l,
                        m,
                        self.render(theta),
                        self.render(phi),
                        self.render(big_phi)
                    )
                }
            }
            Node::PoolSum { body, ranges } => {
                let ranges = ranges.iter().map(|r| self.range(r)).collect::<Vec<_>>();
                if latex {
                    format!("{} {}", ranges.join(" "), self.operand(body, 2))
                } else {
                    format!("sum({}; {})", self.render(body), ranges.join(", "))
                }
            }
        }
    }
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("style", &self.style)
            .field("overrides", &self.formatters.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn latex_real(x: f64) -> String {
    if x.is_nan() {
        "\\mathrm{NaN}".to_string()
    } else if x == f64::INFINITY {
        "\\infty".to_string()
    } else if x == f64::NEG_INFINITY {
        "-\\infty".to_string()
    } else {
        x.to_string()
    }
}

fn latex_imaginary(x: f64) -> String {
    if x == 1.0 {
        "\\imath".to_string()
    } else if x == -1.0 {
        "-\\imath".to_string()
    } else {
        format!("{} \\imath", latex_real(x))
    }
}

fn latex_number(v: Complex64) -> String {
    if v.im == 0.0 {
        latex_real(v.re)
    } else if v.re == 0.0 {
        latex_imaginary(v.im)
    } else {
        let (sign, im) = if v.im < 0.0 { ("-", -v.im) } else { ("+", v.im) };
        format!(
            "\\left({} {sign} {}\\right)",
            latex_real(v.re),
            latex_imaginary(im)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoefficientFamily, Sign, Symbol};

    fn angles() -> (Expr, Expr, Expr) {
        (
            Expr::from(Symbol::coordinate("theta")),
            Expr::from(Symbol::coordinate("phi")),
            Expr::from(Symbol::parameter("Phi")),
        )
    }

    #[test]
    fn test_text_rendering() {
        let x = Expr::from(Symbol::parameter("x"));
        let y = Expr::from(Symbol::parameter("y"));
        assert_eq!((&x - &y).to_string(), "x - y");
        assert_eq!(((&x + &y) * &x).to_string(), "(x + y)*x");
        assert_eq!((&x * 2.0).norm_sqr().to_string(), "|2*x|^2");
        assert_eq!((-&x).to_string(), "-x");
    }

    #[test]
    fn test_latex_zlm() {
        let (theta, phi, big_phi) = angles();
        let z = Expr::zlm(2.into(), (-1).into(), theta, phi, big_phi);
        assert_eq!(
            Printer::latex().render(&z),
            "Z_{2}^{-1}\\left(\\theta, \\phi, \\Phi\\right)"
        );
    }

    #[test]
    fn test_latex_coefficients_and_norms() {
        let family = CoefficientFamily::new("A", Sign::Positive);
        let a = Expr::coefficient(&family, vec![Index::var("m"), Index::var("k")]);
        let latex = Printer::latex();
        assert_eq!(latex.render(&a), "A^{(+)}_{m,k}");
        assert_eq!(
            latex.render(&a.norm_sqr()),
            "\\left|A^{(+)}_{m,k}\\right|^{2}"
        );
        let sum = Expr::pool_sum(
            a,
            vec![
                IndexRange::inclusive("l", 0, 2),
                IndexRange::new("m", &[-1, 1]),
            ],
        );
        assert_eq!(
            latex.render(&sum),
            "\\sum_{l=0}^{2} \\sum_{m \\in \\{-1, 1\\}} A^{(+)}_{m,k}"
        );
    }

    #[test]
    fn test_latex_numbers() {
        let latex = Printer::latex();
        assert_eq!(latex.render(&Expr::number(f64::INFINITY)), "\\infty");
        assert_eq!(latex.render(&Expr::number(f64::NEG_INFINITY)), "-\\infty");
        assert_eq!(latex.render(&Expr::number(2.5)), "2.5");
        assert_eq!(
            latex.render(&Expr::number(Complex64::new(0.0, 2.0))),
            "2 \\imath"
        );
        assert_eq!(latex.render(&Expr::number(Complex64::I)), "\\imath");
        assert_eq!(
            latex.render(&Expr::number(Complex64::new(1.0, -1.0))),
            "\\left(1 - \\imath\\right)"
        );
        assert_eq!(
            latex.render(&Expr::number(Complex64::new(f64::INFINITY, 3.0))),
            "\\left(\\infty + 3 \\imath\\right)"
        );
    }

    #[test]
    fn test_registered_formatter_overrides_one_kind() {
        let (theta, phi, big_phi) = angles();
        let z = Expr::zlm(1.into(), 0.into(), theta.clone(), phi, big_phi) * &theta;
        let plain = Printer::text();
        let custom = Printer::text().with(NodeKind::Zlm, |expr: &Expr, _: &Printer| match expr
            .node()
        {
            Node::Zlm { l, m, .. } => format!("Z{l}{m}"),
            _ => unreachable!(),
        });
        assert_eq!(custom.render(&z), "Z10*theta");
        assert_eq!(plain.render(&z), "Z(1, 0, theta, phi, Phi)*theta");
    }
}
