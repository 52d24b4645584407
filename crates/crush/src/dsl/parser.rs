//! Recursive-descent parser over the token stream produced by
//! [`crate::dsl::lexer`], building the typed tree in [`crate::dsl::ast`].

use super::ast::*;
use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{CrushError, Result};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Parser { tokens, pos: 0 })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, token: &Token, message: impl Into<String>) -> CrushError {
        CrushError::Parse {
            location: token.location,
            fragment: format!("{}: {}", token.text, message.into()),
            line_text: String::new(),
        }
    }

    fn is_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn expect_ident(&mut self) -> Result<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(s) => Ok(s),
            _ => Err(self.error(&token, "expected an identifier")),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Ident(s) if s == keyword => Ok(()),
            _ => Err(self.error(&token, format!("expected '{keyword}'"))),
        }
    }

    fn expect_int(&mut self) -> Result<i64> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(v) => Ok(v),
            TokenKind::Float(v) => Ok(v as i64),
            _ => Err(self.error(&token, "expected an integer")),
        }
    }

    fn expect_number(&mut self) -> Result<f64> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(v) => Ok(v as f64),
            TokenKind::Float(v) => Ok(v),
            _ => Err(self.error(&token, "expected a number")),
        }
    }

    fn expect_lbrace(&mut self) -> Result<()> {
        let token = self.advance();
        match token.kind {
            TokenKind::LBrace => Ok(()),
            _ => Err(self.error(&token, "expected '{'")),
        }
    }

    fn expect_rbrace(&mut self) -> Result<()> {
        let token = self.advance();
        match token.kind {
            TokenKind::RBrace => Ok(()),
            _ => Err(self.error(&token, "expected '}'")),
        }
    }

    fn peek_ident(&self) -> Option<&str> {
        match &self.peek().kind {
            TokenKind::Ident(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Parse the whole program: a sequence of top-level constructs.
    pub fn parse_program(&mut self) -> Result<Program> {
        let mut program = Program::default();
        while !self.is_eof() {
            program.items.push(self.parse_top_level()?);
        }
        Ok(program)
    }

    fn parse_top_level(&mut self) -> Result<TopLevel> {
        match self.peek_ident() {
            Some("device") => self.parse_device().map(TopLevel::Device),
            Some("type") => self.parse_type().map(TopLevel::Type),
            Some("rule") => self.parse_rule().map(TopLevel::Rule),
            Some("tunables") => self.parse_tunables().map(TopLevel::Tunables),
            Some(_) => self.parse_bucket().map(TopLevel::Bucket),
            None => {
                let token = self.advance();
                Err(self.error(&token, "expected a top-level construct"))
            }
        }
    }

    fn parse_device(&mut self) -> Result<DeviceDecl> {
        self.expect_keyword("device")?;
        let id = self.expect_int()?;
        let name = self.expect_ident()?;
        let offload = match self.peek_ident() {
            Some("offload") => {
                self.advance();
                Some(OffloadSpec::Offload(self.expect_number()?))
            }
            Some("load") => {
                self.advance();
                Some(OffloadSpec::Load(self.expect_number()?))
            }
            Some("down") => {
                self.advance();
                Some(OffloadSpec::Down)
            }
            _ => None,
        };
        Ok(DeviceDecl { id, name, offload })
    }

    fn parse_type(&mut self) -> Result<TypeDecl> {
        self.expect_keyword("type")?;
        let level = self.expect_int()?;
        let name = self.expect_ident()?;
        Ok(TypeDecl { level, name })
    }

    fn parse_bucket(&mut self) -> Result<BucketDecl> {
        let type_name = self.expect_ident()?;
        let name = self.expect_ident()?;
        self.expect_lbrace()?;

        let mut id = None;
        let mut alg = None;
        let mut items = Vec::new();

        while self.peek().kind != TokenKind::RBrace {
            match self.peek_ident() {
                Some("id") => {
                    self.advance();
                    id = Some(self.expect_int()?);
                }
                Some("alg") => {
                    self.advance();
                    alg = Some(self.expect_ident()?);
                }
                Some("item") => {
                    self.advance();
                    let item_name = self.expect_ident()?;
                    let mut weight = None;
                    let mut pos = None;
                    loop {
                        match self.peek_ident() {
                            Some("weight") => {
                                self.advance();
                                weight = Some(self.expect_number()?);
                            }
                            Some("pos") => {
                                self.advance();
                                pos = Some(self.expect_int()?);
                            }
                            _ => break,
                        }
                    }
                    items.push(ItemDecl {
                        name: item_name,
                        weight,
                        pos,
                    });
                }
                _ => {
                    let token = self.advance();
                    return Err(self.error(&token, "expected 'id', 'alg', or 'item'"));
                }
            }
        }
        self.expect_rbrace()?;

        let alg = alg.ok_or_else(|| {
            CrushError::semantic(format!("bucket '{name}' is missing an 'alg' clause"))
        })?;

        Ok(BucketDecl {
            type_name,
            name,
            id,
            alg,
            items,
        })
    }

    fn parse_rule(&mut self) -> Result<RuleDecl> {
        self.expect_keyword("rule")?;
        let name = match self.peek().kind.clone() {
            TokenKind::LBrace => None,
            _ => Some(self.expect_ident()?),
        };
        self.expect_lbrace()?;

        let mut pool = None;
        let mut rule_type = None;
        let mut min_size = None;
        let mut max_size = None;
        let mut steps = Vec::new();

        while self.peek().kind != TokenKind::RBrace {
            match self.peek_ident() {
                Some("pool") => {
                    self.advance();
                    pool = Some(self.expect_int()?);
                }
                Some("type") => {
                    self.advance();
                    rule_type = Some(self.expect_ident()?);
                }
                Some("min_size") => {
                    self.advance();
                    min_size = Some(self.expect_int()?);
                }
                Some("max_size") => {
                    self.advance();
                    max_size = Some(self.expect_int()?);
                }
                Some("step") => {
                    self.advance();
                    steps.push(self.parse_step()?);
                }
                _ => {
                    let token = self.advance();
                    return Err(self.error(&token, "expected a rule clause"));
                }
            }
        }
        self.expect_rbrace()?;

        Ok(RuleDecl {
            name,
            pool: pool
                .ok_or_else(|| CrushError::semantic("rule is missing a 'pool' clause"))?,
            rule_type: rule_type
                .ok_or_else(|| CrushError::semantic("rule is missing a 'type' clause"))?,
            min_size: min_size
                .ok_or_else(|| CrushError::semantic("rule is missing a 'min_size' clause"))?,
            max_size: max_size
                .ok_or_else(|| CrushError::semantic("rule is missing a 'max_size' clause"))?,
            steps,
        })
    }

    fn parse_step(&mut self) -> Result<StepDecl> {
        match self.peek_ident() {
            Some("take") => {
                self.advance();
                Ok(StepDecl::Take(self.expect_ident()?))
            }
            Some("emit") => {
                self.advance();
                Ok(StepDecl::Emit)
            }
            Some("noop") => {
                self.advance();
                Ok(StepDecl::Noop)
            }
            Some("choose") | Some("chooseleaf") => {
                let is_leaf = self.peek_ident() == Some("chooseleaf");
                self.advance();
                let indep = match self.peek_ident() {
                    Some("firstn") => {
                        self.advance();
                        false
                    }
                    Some("indep") => {
                        self.advance();
                        true
                    }
                    _ => {
                        let token = self.advance();
                        return Err(self.error(&token, "expected 'firstn' or 'indep'"));
                    }
                };
                let n = self.expect_int()?;
                self.expect_keyword("type")?;
                let type_name = self.expect_ident()?;
                if is_leaf {
                    Ok(StepDecl::ChooseLeaf { indep, n, type_name })
                } else {
                    Ok(StepDecl::Choose { indep, n, type_name })
                }
            }
            _ => {
                let token = self.advance();
                Err(self.error(&token, "expected a step keyword"))
            }
        }
    }

    fn parse_tunables(&mut self) -> Result<TunablesDecl> {
        self.expect_keyword("tunables")?;
        self.expect_lbrace()?;
        let mut entries = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            let key = self.expect_ident()?;
            let value = self.expect_int()?;
            entries.push((key, value));
        }
        self.expect_rbrace()?;
        Ok(TunablesDecl { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_with_offload() {
        let mut parser = Parser::new("device 0 osd0 offload 0.5").unwrap();
        let program = parser.parse_program().unwrap();
        assert_eq!(program.items.len(), 1);
        match &program.items[0] {
            TopLevel::Device(d) => {
                assert_eq!(d.id, 0);
                assert_eq!(d.name, "osd0");
                assert_eq!(d.offload, Some(OffloadSpec::Offload(0.5)));
            }
            _ => panic!("expected device"),
        }
    }

    #[test]
    fn parses_bucket_with_items() {
        let src = "host h0 { id -1 alg straw2 item osd0 weight 1.0 item osd1 }";
        let mut parser = Parser::new(src).unwrap();
        let program = parser.parse_program().unwrap();
        match &program.items[0] {
            TopLevel::Bucket(b) => {
                assert_eq!(b.type_name, "host");
                assert_eq!(b.name, "h0");
                assert_eq!(b.id, Some(-1));
                assert_eq!(b.alg, "straw2");
                assert_eq!(b.items.len(), 2);
                assert_eq!(b.items[0].weight, Some(1.0));
                assert_eq!(b.items[1].weight, None);
            }
            _ => panic!("expected bucket"),
        }
    }

    #[test]
    fn parses_rule_with_steps() {
        let src = "rule data { pool 0 type replicated min_size 1 max_size 10 \
                    step take root step chooseleaf firstn 0 type host step emit }";
        let mut parser = Parser::new(src).unwrap();
        let program = parser.parse_program().unwrap();
        match &program.items[0] {
            TopLevel::Rule(r) => {
                assert_eq!(r.name, Some("data".to_string()));
                assert_eq!(r.pool, 0);
                assert_eq!(r.steps.len(), 3);
                assert!(matches!(r.steps[0], StepDecl::Take(_)));
                assert!(matches!(r.steps[2], StepDecl::Emit));
            }
            _ => panic!("expected rule"),
        }
    }

    #[test]
    fn parses_tunables_block() {
        let src = "tunables { choose_total_tries 50 chooseleaf_vary_r 1 }";
        let mut parser = Parser::new(src).unwrap();
        let program = parser.parse_program().unwrap();
        match &program.items[0] {
            TopLevel::Tunables(t) => {
                assert_eq!(t.entries.len(), 2);
                assert_eq!(t.entries[0], ("choose_total_tries".to_string(), 50));
            }
            _ => panic!("expected tunables"),
        }
    }

    #[test]
    fn missing_brace_is_a_parse_error() {
        let mut parser = Parser::new("host h0 { id -1 alg straw2 item osd0").unwrap();
        assert!(parser.parse_program().is_err());
    }
}
