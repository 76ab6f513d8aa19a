pub mod bytes_ext;
pub mod descriptor;
pub mod encoding;

#[cfg(test)]
mod tests {
    use crate::descriptor::{BaseType, FieldType, MethodSignature, MethodType, ObjectType};
    use anyhow::Result;

    #[test]
    fn it_parses_simple_descriptors() -> Result<()> {
        let descriptor = FieldType::parse("Z")?;
        let descriptor = descriptor.into_base().unwrap();

        assert!(descriptor.is_boolean());

        Ok(())
    }

    #[test]
    fn it_parses_array_descriptors() -> Result<()> {
        let descriptor = FieldType::parse("[D")?;
        let descriptor = descriptor.into_array().unwrap();

        let field = descriptor.field_type;
        let field = field.into_base().unwrap();

        assert!(field.is_double());

        Ok(())
    }

    #[test]
    fn it_parses_class_descriptors() -> Result<()> {
        let descriptor = FieldType::parse("Ljava/lang/Object;")?;
        let descriptor = descriptor.into_object().unwrap();

        assert_eq!(descriptor.descriptor, "Ljava/lang/Object;");

        Ok(())
    }

    #[test]
    fn it_parses_method_descriptors() -> Result<()> {
        let descriptor = MethodType::parse("(IDLjava/lang/Thread;)Ljava/lang/Object;")?;
        assert_eq!(
            descriptor.parameters,
            vec![
                FieldType::Base(BaseType::Int),
                FieldType::Base(BaseType::Double),
                FieldType::Object(ObjectType {
                    descriptor: "Ljava/lang/Thread;".to_string()
                })
            ]
        );

        assert_eq!(
            descriptor.return_type,
            FieldType::Object(ObjectType {
                descriptor: "Ljava/lang/Object;".to_string()
            })
        );

        Ok(())
    }

    #[test]
    fn it_unparses_method_descriptors() -> Result<()> {
        let descriptor = MethodType::parse("(IDLjava/lang/Thread;)Ljava/lang/Object;")?;
        let unparsed = descriptor.to_string();

        assert_eq!(unparsed, "(IDLjava/lang/Thread;)Ljava/lang/Object;");

        Ok(())
    }

    #[test]
    fn it_tracks_register_widths() -> Result<()> {
        let descriptor = MethodType::parse("(IJLjava/lang/String;D)V")?;
        let widths = descriptor
            .parameters
            .iter()
            .map(|p| p.register_width())
            .collect::<Vec<_>>();

        assert_eq!(widths, vec![1, 2, 1, 2]);

        Ok(())
    }

    #[test]
    fn it_parses_full_signatures() -> Result<()> {
        let sig = MethodSignature::parse("Lcom/example/Crypt;->decrypt(Ljava/lang/String;I)[B")?;
        assert_eq!(sig.class, "Lcom/example/Crypt;");
        assert_eq!(sig.name, "decrypt");
        assert_eq!(sig.descriptor.parameters.len(), 2);

        Ok(())
    }

    #[test]
    fn it_parses_bare_signatures() -> Result<()> {
        let sig = MethodSignature::parse_loose("Lcom/example/Crypt;->decrypt")?;
        assert_eq!(sig.0, "Lcom/example/Crypt;");
        assert_eq!(sig.1, "decrypt");

        Ok(())
    }
}
