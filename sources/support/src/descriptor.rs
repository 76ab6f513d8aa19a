use std::{iter::Peekable, str::Chars};

use anyhow::{anyhow, Result};
use enum_as_inner::EnumAsInner;

/// <BaseType> ::= 'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' | 'V'
#[derive(EnumAsInner, Debug, PartialEq, Eq, Clone)]
pub enum BaseType {
    Boolean, // Z
    Char,    // C
    Float,   // F
    Double,  // D
    Byte,    // B
    Short,   // S
    Int,     // I
    Long,    // J
    Void,    // V
}

impl ToString for BaseType {
    fn to_string(&self) -> String {
        match self {
            BaseType::Boolean => "Z",
            BaseType::Char => "C",
            BaseType::Float => "F",
            BaseType::Double => "D",
            BaseType::Byte => "B",
            BaseType::Short => "S",
            BaseType::Int => "I",
            BaseType::Long => "J",
            BaseType::Void => "V",
        }
        .to_string()
    }
}

/// <ObjectType> ::= 'L' <ClassName> ';'
///
/// Dalvik refers to classes by the full descriptor (`Lpkg/Cls;`), so we keep
/// it verbatim rather than stripping the sigils.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ObjectType {
    pub descriptor: String,
}

impl ToString for ObjectType {
    fn to_string(&self) -> String {
        self.descriptor.clone()
    }
}

/// <ArrayType> ::= '[' <FieldType>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ArrayType {
    pub field_type: Box<FieldType>,
}

impl ToString for ArrayType {
    fn to_string(&self) -> String {
        format!("[{}", self.field_type.to_string())
    }
}

#[derive(EnumAsInner, Debug, PartialEq, Eq, Clone)]
pub enum FieldType {
    Base(BaseType),
    Object(ObjectType),
    Array(ArrayType),
}

impl FieldType {
    fn parse_from_iterator(chars: &mut Peekable<Chars>) -> Result<Self> {
        let first = chars.next().ok_or(anyhow!("no more chars"))?;

        Ok(match first {
            'B' => FieldType::Base(BaseType::Byte),
            'C' => FieldType::Base(BaseType::Char),
            'D' => FieldType::Base(BaseType::Double),
            'F' => FieldType::Base(BaseType::Float),
            'I' => FieldType::Base(BaseType::Int),
            'J' => FieldType::Base(BaseType::Long),
            'S' => FieldType::Base(BaseType::Short),
            'Z' => FieldType::Base(BaseType::Boolean),
            'V' => FieldType::Base(BaseType::Void),
            '[' => FieldType::Array(ArrayType {
                field_type: Box::new(FieldType::parse_from_iterator(chars)?),
            }),
            'L' => {
                let name = chars.take_while(|c| *c != ';').collect::<String>();
                FieldType::Object(ObjectType {
                    descriptor: format!("L{};", name),
                })
            }
            _ => return Err(anyhow!("unknown type {first}")),
        })
    }

    pub fn parse(str: &str) -> Result<Self> {
        let chars = str.chars();
        FieldType::parse_from_iterator(&mut chars.peekable())
    }

    /// How many register slots a value of this type occupies. Longs and
    /// doubles take a pair, everything else one slot.
    pub fn register_width(&self) -> usize {
        match self {
            FieldType::Base(BaseType::Long) | FieldType::Base(BaseType::Double) => 2,
            _ => 1,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.register_width() == 2
    }
}

impl ToString for FieldType {
    fn to_string(&self) -> String {
        match self {
            FieldType::Base(base) => base.to_string(),
            FieldType::Object(object) => object.to_string(),
            FieldType::Array(array) => array.to_string(),
        }
    }
}

/// <MethodType> ::= '(' { <FieldType> } ')' <FieldType>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MethodType {
    pub parameters: Vec<FieldType>,
    pub return_type: FieldType,
}

impl MethodType {
    pub fn parse(str: &str) -> Result<Self> {
        let mut chars = str.chars().peekable();
        if chars.next() != Some('(') {
            return Err(anyhow!("descriptor did not start with ("));
        }

        let mut parameters = Vec::new();

        while chars.peek() != Some(&')') {
            if chars.peek().is_none() {
                return Err(anyhow!("descriptor ended before )"));
            }
            parameters.push(FieldType::parse_from_iterator(&mut chars)?);
        }

        // Skip )
        chars.next();

        let return_type = FieldType::parse_from_iterator(&mut chars)?;

        Ok(MethodType {
            parameters,
            return_type,
        })
    }

    /// Total register slots the parameters occupy, wides counted twice.
    pub fn ins_width(&self) -> usize {
        self.parameters.iter().map(|p| p.register_width()).sum()
    }
}

impl ToString for MethodType {
    fn to_string(&self) -> String {
        format!(
            "({}){}",
            self.parameters
                .iter()
                .map(|p| p.to_string())
                .collect::<String>(),
            self.return_type.to_string()
        )
    }
}

/// A fully qualified method signature, `Lpkg/Cls;->name(params)ret`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MethodSignature {
    pub class: String,
    pub name: String,
    pub descriptor: MethodType,
}

impl MethodSignature {
    pub fn parse(str: &str) -> Result<Self> {
        let (class, rest) = str
            .split_once("->")
            .ok_or(anyhow!("signature has no -> separator: {str}"))?;

        let paren = rest
            .find('(')
            .ok_or(anyhow!("signature has no parameter list: {str}"))?;

        let (name, descriptor) = rest.split_at(paren);

        Ok(Self {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: MethodType::parse(descriptor)?,
        })
    }

    /// Parse a signature that may omit the parameter list, returning only
    /// the class and name parts.
    pub fn parse_loose(str: &str) -> Result<(String, String)> {
        let (class, rest) = str
            .split_once("->")
            .ok_or(anyhow!("signature has no -> separator: {str}"))?;

        let name = match rest.find('(') {
            Some(paren) => &rest[..paren],
            None => rest,
        };

        Ok((class.to_string(), name.to_string()))
    }
}

impl ToString for MethodSignature {
    fn to_string(&self) -> String {
        format!(
            "{}->{}{}",
            self.class,
            self.name,
            self.descriptor.to_string()
        )
    }
}
