// Graphics pipeline creation
//
// One render pass with a single color attachment, one pipeline drawing a
// triangle whose vertices are generated in the vertex shader.

use ash::vk;

use super::driver::{Driver, PipelineDesc, RenderPassDesc, Resource, ShaderStageDesc};
use super::error::{BringUpError, Result, Stage};
use super::lifecycle::ReleaseStack;
use super::shader::{create_shader_module, load_stage, ShaderKind, ShaderSource};

const STAGES: [ShaderKind; 2] = [ShaderKind::Vertex, ShaderKind::Fragment];

/// Clear on load, keep on store, hand off ready for presentation
pub fn render_pass_desc(format: vk::Format) -> RenderPassDesc {
    RenderPassDesc {
        format,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn pipeline_desc(
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    stages: Vec<ShaderStageDesc>,
    extent: vk::Extent2D,
) -> PipelineDesc {
    PipelineDesc {
        render_pass,
        layout,
        stages,
        entry_point: c"main",
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        extent,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        depth_test: false,
        blend_enable: false,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    }
}

/// Immutable once built; owned by the logical device
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipeline {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

pub fn assemble_pipeline<D, S>(
    driver: &mut D,
    shaders: &S,
    shader_name: &str,
    format: vk::Format,
    extent: vk::Extent2D,
    ledger: &mut ReleaseStack,
) -> Result<GraphicsPipeline>
where
    D: Driver + ?Sized,
    S: ShaderSource + ?Sized,
{
    let code = STAGES
        .iter()
        .map(|&kind| Ok((kind, load_stage(shaders, shader_name, kind)?)))
        .collect::<Result<Vec<_>>>()?;

    let render_pass = driver
        .create_render_pass(&render_pass_desc(format))
        .map_err(|result| BringUpError::PipelineCreationFailed { stage: Stage::RenderPass, result })?;
    ledger.push(Resource::RenderPass(render_pass));

    let layout = driver
        .create_pipeline_layout()
        .map_err(|result| BringUpError::PipelineCreationFailed { stage: Stage::PipelineLayout, result })?;
    ledger.push(Resource::PipelineLayout(layout));

    // Modules only live until the pipeline exists
    let mut stages = Vec::with_capacity(code.len());
    for (kind, words) in &code {
        match create_shader_module(driver, words) {
            Ok(module) => stages.push(ShaderStageDesc {
                stage: kind.stage(),
                module,
            }),
            Err(err) => {
                discard_modules(driver, &stages);
                return Err(err);
            }
        }
    }

    let result = driver.create_graphics_pipeline(&pipeline_desc(render_pass, layout, stages.clone(), extent));
    discard_modules(driver, &stages);

    let pipeline =
        result.map_err(|result| BringUpError::PipelineCreationFailed { stage: Stage::Pipeline, result })?;
    ledger.push(Resource::Pipeline(pipeline));

    log::info!("Created graphics pipeline ({}x{})", extent.width, extent.height);

    Ok(GraphicsPipeline {
        render_pass,
        layout,
        pipeline,
    })
}

fn discard_modules<D: Driver + ?Sized>(driver: &mut D, stages: &[ShaderStageDesc]) {
    for stage in stages.iter().rev() {
        driver.destroy(Resource::ShaderModule(stage.module));
    }
}
