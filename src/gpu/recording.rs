//! In-memory command sink.
//!
//! [`RecordingDevice`] accepts every [`GpuDevice`] command and appends it to a
//! log. Programs are reflected the same way the wgpu backend reflects them, so
//! uniform lookups resolve (or fail) exactly as they would on a GPU and writes
//! are type-checked against the shader declaration.

use std::collections::HashSet;

use anyhow::bail;

use crate::{
    data_structures::{mesh::VertexLayout, texture::TextureData},
    gpu::{
        GpuDevice, ProgramHandle, ProgramSource, TextureHandle, UniformLocation, UniformValue,
        VertexArrayHandle, wgsl::UniformBlock,
    },
};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CompileProgram {
        program: ProgramHandle,
        name: String,
    },
    CreateTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
    },
    CreateVertexArray {
        vertex_array: VertexArrayHandle,
        vertex_count: u32,
    },
    Clear([f32; 4]),
    UseProgram(ProgramHandle),
    SetUniform {
        program: ProgramHandle,
        name: String,
        value: UniformValue,
    },
    SetUniformVec3Array {
        program: ProgramHandle,
        name: String,
        values: Vec<[f32; 3]>,
    },
    BindVertexArray(VertexArrayHandle),
    BindTexture {
        unit: usize,
        texture: TextureHandle,
    },
    UnbindTexture {
        unit: usize,
    },
    DrawArrays {
        program: ProgramHandle,
        vertex_array: VertexArrayHandle,
        vertex_count: u32,
    },
}

#[derive(Debug)]
struct RecordedProgram {
    name: String,
    block: UniformBlock,
    staging: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct RecordingDevice {
    commands: Vec<Command>,
    programs: Vec<RecordedProgram>,
    failing: HashSet<String>,
    textures: u32,
    vertex_arrays: Vec<u32>,
    current_program: Option<ProgramHandle>,
    current_vertex_array: Option<VertexArrayHandle>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make compilation of the program called `name` fail from now on.
    pub fn fail_compilation_of(&mut self, name: impl Into<String>) {
        self.failing.insert(name.into());
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn count(&self, matches: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| matches(c)).count()
    }

    pub fn draw_count(&self) -> usize {
        self.count(|c| matches!(c, Command::DrawArrays { .. }))
    }

    /// Every value written to a uniform called `name`, oldest first.
    pub fn uniform_writes(&self, name: &str) -> Vec<UniformValue> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SetUniform {
                    name: written,
                    value,
                    ..
                } if written == name => Some(*value),
                _ => None,
            })
            .collect()
    }

    pub fn program_name(&self, program: ProgramHandle) -> Option<&str> {
        self.programs
            .get(program.0 as usize)
            .map(|p| p.name.as_str())
    }

    fn current(&mut self) -> (ProgramHandle, &mut RecordedProgram) {
        let Some(program) = self.current_program else {
            panic!("uniform written while no program is in use");
        };
        (program, &mut self.programs[program.0 as usize])
    }
}

impl GpuDevice for RecordingDevice {
    fn compile_program(&mut self, source: &ProgramSource) -> anyhow::Result<ProgramHandle> {
        if self.failing.contains(&source.name) {
            bail!("program {} failed to link", source.name);
        }
        if source.vertex.trim().is_empty() || source.fragment.trim().is_empty() {
            bail!("program {} has an empty stage", source.name);
        }
        let block = UniformBlock::reflect_program(source)?;
        let program = ProgramHandle(self.programs.len() as u32);
        self.programs.push(RecordedProgram {
            name: source.name.clone(),
            staging: vec![0; block.size as usize],
            block,
        });
        self.commands.push(Command::CompileProgram {
            program,
            name: source.name.clone(),
        });
        Ok(program)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> UniformLocation {
        self.programs
            .get(program.0 as usize)
            .and_then(|p| p.block.location(name))
            .map_or(UniformLocation::INVALID, |i| UniformLocation(i as i32))
    }

    fn create_texture(&mut self, data: &TextureData) -> anyhow::Result<TextureHandle> {
        let texture = TextureHandle(self.textures);
        self.textures += 1;
        self.commands.push(Command::CreateTexture {
            texture,
            width: data.width,
            height: data.height,
        });
        Ok(texture)
    }

    fn create_vertex_array(
        &mut self,
        vertices: &[f32],
        layout: &VertexLayout,
    ) -> anyhow::Result<VertexArrayHandle> {
        let stride = layout.stride();
        if stride == 0 || vertices.len() % stride != 0 {
            bail!("vertex stream does not match its layout");
        }
        let vertex_count = (vertices.len() / stride) as u32;
        let vertex_array = VertexArrayHandle(self.vertex_arrays.len() as u32);
        self.vertex_arrays.push(vertex_count);
        self.commands.push(Command::CreateVertexArray {
            vertex_array,
            vertex_count,
        });
        Ok(vertex_array)
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.commands.push(Command::Clear(color));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        assert!(
            (program.0 as usize) < self.programs.len(),
            "program {program:?} was never compiled"
        );
        self.current_program = Some(program);
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let (program, recorded) = self.current();
        let Some(index) = location.index() else {
            panic!("write to an invalid uniform location");
        };
        if let Err(err) = recorded.block.write(&mut recorded.staging, index, value) {
            panic!("program {}: {err:#}", recorded.name);
        }
        let name = recorded.block.slots[index].name.clone();
        self.commands.push(Command::SetUniform {
            program,
            name,
            value: *value,
        });
    }

    fn set_uniform_vec3_array(&mut self, location: UniformLocation, values: &[[f32; 3]]) {
        let (program, recorded) = self.current();
        let Some(index) = location.index() else {
            panic!("write to an invalid uniform location");
        };
        if let Err(err) = recorded
            .block
            .write_vec3_array(&mut recorded.staging, index, values)
        {
            panic!("program {}: {err:#}", recorded.name);
        }
        let name = recorded.block.slots[index].name.clone();
        self.commands.push(Command::SetUniformVec3Array {
            program,
            name,
            values: values.to_vec(),
        });
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        assert!(
            (vertex_array.0 as usize) < self.vertex_arrays.len(),
            "vertex array {vertex_array:?} was never created"
        );
        self.current_vertex_array = Some(vertex_array);
        self.commands.push(Command::BindVertexArray(vertex_array));
    }

    fn bind_texture(&mut self, unit: usize, texture: TextureHandle) {
        assert!(texture.0 < self.textures, "texture {texture:?} was never created");
        self.commands.push(Command::BindTexture { unit, texture });
    }

    fn unbind_texture(&mut self, unit: usize) {
        self.commands.push(Command::UnbindTexture { unit });
    }

    fn draw_arrays(&mut self, vertex_count: u32) {
        let (Some(program), Some(vertex_array)) = (self.current_program, self.current_vertex_array)
        else {
            panic!("draw without a program and a vertex array");
        };
        self.commands.push(Command::DrawArrays {
            program,
            vertex_array,
            vertex_count,
        });
    }
}
