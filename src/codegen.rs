use std::collections::HashMap;

use crate::{
    ast::{self, BinaryOperator, Expr, Program, Prototype},
    ir::{self, BinaryOp, BlockId, FuncId, Op, Terminator, ValueId},
};

/// Name of the synthesized entry point. Reserved: a user program declaring
/// it fails with [`Error::DuplicateDeclaration`].
pub const ENTRY_POINT: &str = "main";

/// Name of the external print routine the entry point hands every top-level
/// expression's value to. Also reserved.
pub const PRINT_ROUTINE: &str = "print";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("function `{2}` expects {1} argument(s), got {0}")]
    ArgumentCountMismatch(usize, usize, String),
    #[error("duplicate declaration of `{0}`")]
    DuplicateDeclaration(String),
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Lowers a whole program into an IR module.
///
/// Externs are declared first, then the function definitions, and finally
/// the synthesized entry point sequencing the top-level expressions; a
/// callee must appear, in that order, before its first call site. The first
/// failure aborts the whole generation.
pub fn generate(program: &Program) -> Result<ir::Module> {
    Generator::new().generate(program)
}

struct Generator {
    module: ir::Module,
    /// Maps a variable name to its value handle. Valid for one function body
    /// at a time; cleared at every function boundary, since the language has
    /// no nested scopes.
    symbols: HashMap<String, ValueId>,
    cursor: Cursor,
    print: FuncId,
    main: FuncId,
    main_entry: BlockId,
}

/// The instruction-emission position. Everything is appended here.
#[derive(Copy, Clone)]
struct Cursor {
    func: FuncId,
    block: BlockId,
}

impl Generator {
    fn new() -> Generator {
        let mut module = ir::Module::new();
        // Claiming the reserved names up front makes user redeclarations of
        // either fail through the ordinary duplicate check.
        let print = module.declare(PRINT_ROUTINE, 1).expect("fresh module");
        let main = module.declare(ENTRY_POINT, 0).expect("fresh module");
        let main_entry = module.function_mut(main).new_block();
        Generator {
            module,
            symbols: HashMap::new(),
            cursor: Cursor {
                func: main,
                block: main_entry,
            },
            print,
            main,
            main_entry,
        }
    }

    fn generate(mut self, program: &Program) -> Result<ir::Module> {
        for prototype in &program.externs {
            self.declare(prototype)?;
        }
        for function in &program.functions {
            self.function(function)?;
        }
        self.entry_point(&program.top_level)?;
        Ok(self.module)
    }

    fn declare(&mut self, prototype: &Prototype) -> Result<FuncId> {
        self.module
            .declare(&prototype.name, prototype.params.len())
            .map_err(|()| Error::DuplicateDeclaration(prototype.name.clone()))
    }

    fn function(&mut self, function: &ast::Function) -> Result<()> {
        let func = self.declare(&function.prototype)?;
        self.enter(func, &function.prototype.params);
        let value = self.expr(&function.body)?;
        self.terminate(Terminator::Return(value));
        Ok(())
    }

    /// Synthesizes the entry point: every top-level expression is lowered in
    /// source order and its value handed to the print routine. The entry
    /// point itself returns zero.
    fn entry_point(&mut self, top_level: &[Expr]) -> Result<()> {
        self.symbols.clear();
        self.cursor = Cursor {
            func: self.main,
            block: self.main_entry,
        };
        for expr in top_level {
            let value = self.expr(expr)?;
            self.emit(Op::Call(self.print, vec![value]));
        }
        let zero = self.emit(Op::Const(0.0));
        self.terminate(Terminator::Return(zero));
        Ok(())
    }

    /// Begins emitting into `func`: fresh entry block, parameters bound in a
    /// cleared symbol table.
    fn enter(&mut self, func: FuncId, params: &[String]) {
        self.symbols.clear();
        let function = self.module.function_mut(func);
        let entry = function.new_block();
        // Duplicate parameter names are legal and unchecked; the last one
        // wins.
        for (name, value) in params.iter().zip(function.param_values()) {
            self.symbols.insert(name.clone(), value);
        }
        self.cursor = Cursor { func, block: entry };
    }

    fn expr(&mut self, expr: &Expr) -> Result<ValueId> {
        match expr {
            Expr::Number(value) => Ok(self.emit(Op::Const(*value))),
            Expr::Variable(name) => self
                .symbols
                .get(name)
                .copied()
                .ok_or_else(|| Error::UnknownVariable(name.clone())),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                Ok(self.emit(Op::Binary(convert_op(*op), lhs, rhs)))
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::Conditional {
                predicate,
                then_arm,
                else_arm,
            } => self.conditional(predicate, then_arm, else_arm),
        }
    }

    fn call(&mut self, callee: &str, args: &[Expr]) -> Result<ValueId> {
        let func = self
            .module
            .lookup(callee)
            .ok_or_else(|| Error::UnknownFunction(callee.to_string()))?;
        let expected = self.module.function(func).params();
        if args.len() != expected {
            return Err(Error::ArgumentCountMismatch(
                args.len(),
                expected,
                callee.to_string(),
            ));
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.expr(arg)?);
        }
        Ok(self.emit(Op::Call(func, values)))
    }

    /// Lowers `if`/`then`/`else` as four linked blocks:
    ///
    /// ```text
    /// {current} --jmp--> {cond} --brnz--> {then | else} --jmp--> {merge}
    /// ```
    ///
    /// The merge block's phi selects the arm value matching the predecessor
    /// control arrived from; that phi is the value of the whole conditional.
    fn conditional(
        &mut self,
        predicate: &Expr,
        then_arm: &Expr,
        else_arm: &Expr,
    ) -> Result<ValueId> {
        let cond_block = self.new_block();
        let then_block = self.new_block();
        let else_block = self.new_block();
        let merge_block = self.new_block();

        self.terminate(Terminator::Jump(cond_block));

        self.seek(cond_block);
        let cond = self.expr(predicate)?;
        self.terminate(Terminator::Branch {
            cond,
            nonzero: then_block,
            zero: else_block,
        });

        self.seek(then_block);
        let then_value = self.expr(then_arm)?;
        // A nested conditional moves the cursor; each phi edge must name the
        // block its arm actually ended in.
        let then_end = self.cursor.block;
        self.terminate(Terminator::Jump(merge_block));

        self.seek(else_block);
        let else_value = self.expr(else_arm)?;
        let else_end = self.cursor.block;
        self.terminate(Terminator::Jump(merge_block));

        self.seek(merge_block);
        Ok(self.emit(Op::Phi(vec![(then_end, then_value), (else_end, else_value)])))
    }
}

/// Emission helpers over the cursor.
impl Generator {
    fn emit(&mut self, op: Op) -> ValueId {
        self.module
            .function_mut(self.cursor.func)
            .push(self.cursor.block, op)
    }

    fn terminate(&mut self, terminator: Terminator) {
        self.module
            .function_mut(self.cursor.func)
            .terminate(self.cursor.block, terminator);
    }

    fn new_block(&mut self) -> BlockId {
        self.module.function_mut(self.cursor.func).new_block()
    }

    fn seek(&mut self, block: BlockId) {
        self.cursor.block = block;
    }
}

fn convert_op(op: BinaryOperator) -> BinaryOp {
    match op {
        BinaryOperator::Add => BinaryOp::Add,
        BinaryOperator::Sub => BinaryOp::Sub,
        BinaryOperator::Mul => BinaryOp::Mul,
        BinaryOperator::Div => BinaryOp::Div,
        BinaryOperator::Rem => BinaryOp::Rem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::Lexer, parser};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn gen(src: &str) -> Result<ir::Module> {
        let program = parser::parse_program(Lexer::new(src)).expect("failed to parse");
        generate(&program)
    }

    #[test]
    fn empty_program_still_defines_the_entry_point() {
        assert_eq!(
            gen("").unwrap().to_string(),
            indoc! {"
                declare print(1)

                define main() {
                bb0:
                  %0 = const 0
                  ret %0
                }
            "}
        );
    }

    #[test]
    fn function_definition_and_call() {
        assert_eq!(
            gen("def f(x) x + 1; f(5)").unwrap().to_string(),
            indoc! {"
                declare print(1)

                define main() {
                bb0:
                  %0 = const 5
                  %1 = call f(%0)
                  %2 = call print(%1)
                  %3 = const 0
                  ret %3
                }

                define f(%0) {
                bb0:
                  %1 = const 1
                  %2 = add %0, %1
                  ret %2
                }
            "}
        );
    }

    #[test]
    fn extern_declaration_and_call() {
        assert_eq!(
            gen("extern sin(x); sin(1)").unwrap().to_string(),
            indoc! {"
                declare print(1)

                define main() {
                bb0:
                  %0 = const 1
                  %1 = call sin(%0)
                  %2 = call print(%1)
                  %3 = const 0
                  ret %3
                }

                declare sin(1)
            "}
        );
    }

    #[test]
    fn every_operator_lowers_to_its_instruction() {
        // Right-associative chain: 1 + (2 - (3 * (4 / (5 % 6)))).
        assert_eq!(
            gen("1 + 2 - 3 * 4 / 5 % 6").unwrap().to_string(),
            indoc! {"
                declare print(1)

                define main() {
                bb0:
                  %0 = const 1
                  %1 = const 2
                  %2 = const 3
                  %3 = const 4
                  %4 = const 5
                  %5 = const 6
                  %6 = rem %4, %5
                  %7 = div %3, %6
                  %8 = mul %2, %7
                  %9 = sub %1, %8
                  %10 = add %0, %9
                  %11 = call print(%10)
                  %12 = const 0
                  ret %12
                }
            "}
        );
    }

    #[test]
    fn conditional_lowers_to_four_blocks_and_a_phi() {
        assert_eq!(
            gen("if 0 then 10 else 20").unwrap().to_string(),
            indoc! {"
                declare print(1)

                define main() {
                bb0:
                  jmp bb1
                bb1:
                  %0 = const 0
                  brnz %0, bb2, bb3
                bb2:
                  %1 = const 10
                  jmp bb4
                bb3:
                  %2 = const 20
                  jmp bb4
                bb4:
                  %3 = phi [bb2: %1, bb3: %2]
                  %4 = call print(%3)
                  %5 = const 0
                  ret %5
                }
            "}
        );
    }

    #[test]
    fn nested_conditional_phi_names_the_arm_end_blocks() {
        assert_eq!(
            gen("def f(x) if x then if x then 1 else 2 else 3;")
                .unwrap()
                .to_string(),
            indoc! {"
                declare print(1)

                define main() {
                bb0:
                  %0 = const 0
                  ret %0
                }

                define f(%0) {
                bb0:
                  jmp bb1
                bb1:
                  brnz %0, bb2, bb3
                bb2:
                  jmp bb5
                bb3:
                  %4 = const 3
                  jmp bb4
                bb4:
                  %5 = phi [bb8: %3, bb3: %4]
                  ret %5
                bb5:
                  brnz %0, bb6, bb7
                bb6:
                  %1 = const 1
                  jmp bb8
                bb7:
                  %2 = const 2
                  jmp bb8
                bb8:
                  %3 = phi [bb6: %1, bb7: %2]
                  jmp bb4
                }
            "}
        );
    }

    #[test]
    fn branch_on_zero_selects_the_else_block() {
        let module = gen("if 0 then 10 else 20").unwrap();
        let main = module.lookup(ENTRY_POINT).unwrap();
        let function = module.function(main);

        // The entry jumps into the condition block, which ends in the
        // two-way branch.
        let Some(Terminator::Jump(cond_block)) = function.blocks()[0].terminator() else {
            panic!("entry block must jump to the condition block");
        };
        let Some(Terminator::Branch { zero, .. }) = function[*cond_block].terminator() else {
            panic!("condition block must end in a branch");
        };

        // With a zero condition, control transfers to the else block; its
        // constant is what reaches the merge phi at runtime.
        let Op::Const(value) = &function[*zero].insts()[0].op else {
            panic!("else block must start with the else-arm constant");
        };
        assert_eq!(*value, 20.0);

        // The print routine is the module's only external declaration.
        let declared: Vec<_> = module
            .functions()
            .filter(|f| f.is_declaration())
            .map(ir::Function::name)
            .collect();
        assert_eq!(declared, [PRINT_ROUTINE]);
    }

    #[test]
    fn unknown_variable() {
        assert_eq!(gen("x").unwrap_err(), Error::UnknownVariable("x".to_string()));
        assert_eq!(gen("def f(x) y;").unwrap_err(), Error::UnknownVariable("y".to_string()));
    }

    #[test]
    fn symbol_table_is_cleared_between_functions() {
        assert_eq!(
            gen("def f(x) x; def g(y) x;").unwrap_err(),
            Error::UnknownVariable("x".to_string())
        );
    }

    #[test]
    fn unknown_function() {
        assert_eq!(gen("g(1)").unwrap_err(), Error::UnknownFunction("g".to_string()));
    }

    #[test]
    fn functions_resolve_in_processing_order() {
        // Functions are lowered before the entry point, so a top-level call
        // may refer to a later definition...
        assert!(gen("f(1); def f(x) x;").is_ok());
        // ...but a function body cannot refer to a function defined after it.
        assert_eq!(
            gen("def g(x) h(x); def h(x) x;").unwrap_err(),
            Error::UnknownFunction("h".to_string())
        );
        // Recursion works: the callee is declared before its body lowers.
        assert!(gen("def f(x) f(x);").is_ok());
    }

    #[test]
    fn argument_count_mismatch() {
        assert_eq!(
            gen("def f(x) x + 1; f(5, 6)").unwrap_err(),
            Error::ArgumentCountMismatch(2, 1, "f".to_string())
        );
        assert_eq!(
            gen("extern sin(x); sin()").unwrap_err(),
            Error::ArgumentCountMismatch(0, 1, "sin".to_string())
        );
    }

    #[test]
    fn duplicate_declarations() {
        assert_eq!(
            gen("def f(x) x; def f(y) y;").unwrap_err(),
            Error::DuplicateDeclaration("f".to_string())
        );
        assert_eq!(
            gen("extern f(x); def f(y) y;").unwrap_err(),
            Error::DuplicateDeclaration("f".to_string())
        );
    }

    #[test]
    fn reserved_names_cannot_be_redeclared() {
        assert_eq!(
            gen("def main() 1;").unwrap_err(),
            Error::DuplicateDeclaration("main".to_string())
        );
        assert_eq!(
            gen("extern print(x);").unwrap_err(),
            Error::DuplicateDeclaration("print".to_string())
        );
    }

    #[test]
    fn user_code_may_call_the_print_routine() {
        assert!(gen("print(42)").is_ok());
        assert!(gen("def shout(x) print(x * 2);").is_ok());
    }
}
